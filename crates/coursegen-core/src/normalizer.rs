//! Transport framing removal and display filtering for raw fragments.
//!
//! Two passes with different consumers:
//! - [`strip_framing`] produces the text that goes into the response buffer.
//!   It must never drop payload characters, since structured data is
//!   extracted from that buffer.
//! - [`displayable_text`] decides what part of a fragment is worth a `text`
//!   section. It drops progress filler and code-fence chrome.

use once_cell::sync::Lazy;
use regex::Regex;

/// ANSI escape sequences some transports forward verbatim.
static ANSI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\x1b\[[0-9;?]*[A-Za-z]",     // CSI sequences
        r"|\x1b\][^\x07]*\x07",         // OSC sequences ending with BEL
        r"|\x1b\][^\x1b]*\x1b\\",       // OSC sequences ending with ST
        r"|\x1b[()][A-Z0-9]",           // Character set selection
        r"|\x1b",                       // Catch any remaining bare ESC
    ))
    .unwrap()
});

/// Server-sent-events framing: at least one `data:` field line.
static SSE_DATA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^data:").unwrap());

static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*$").unwrap());

/// Lines made only of dots, ellipses, bullets or spinner glyphs.
static FILLER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[.…·•●⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏\s]+$").unwrap());

const SSE_DONE: &str = "[DONE]";

/// Strip transport framing from a raw fragment.
pub fn strip_framing(raw: &str) -> String {
    let text = ANSI_REGEX.replace_all(raw, "");
    let text = text.replace('\r', "");

    if SSE_DATA_REGEX.is_match(&text) {
        strip_sse(&text)
    } else {
        text
    }
}

/// Keep the payload of `data:` fields. Data lines of one event are joined
/// with a newline; `event:`/`id:`/comment lines and the `[DONE]` sentinel
/// are dropped.
fn strip_sse(text: &str) -> String {
    fn flush(event: &mut Vec<&str>, out: &mut String) {
        out.push_str(&event.join("\n"));
        event.clear();
    }

    let mut out = String::new();
    let mut event: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.is_empty() {
            flush(&mut event, &mut out);
            continue;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if payload.trim() != SSE_DONE {
                event.push(payload);
            }
        }
    }
    flush(&mut event, &mut out);

    out
}

/// Text worth showing as a `text` section, or `None` if the fragment is only
/// whitespace, progress filler or code fences.
pub fn displayable_text(text: &str) -> Option<String> {
    let mut result = String::new();

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();

        if CODE_FENCE_REGEX.is_match(trimmed) {
            continue;
        }

        if !trimmed.is_empty() && FILLER_REGEX.is_match(trimmed) {
            continue;
        }

        result.push_str(line);
    }

    if result.trim().is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_framing_plain_text_untouched() {
        assert_eq!(strip_framing("Hello {\"a\": 1}\n"), "Hello {\"a\": 1}\n");
        assert_eq!(strip_framing(""), "");
    }

    #[test]
    fn test_strip_framing_removes_ansi_and_cr() {
        assert_eq!(strip_framing("\x1b[32mHello\x1b[0m\r\n"), "Hello\n");
    }

    #[test]
    fn test_strip_framing_sse() {
        let raw = "data: [Thinking...] plan\n\ndata: ning\n\n";
        assert_eq!(strip_framing(raw), "[Thinking...] planning");
    }

    #[test]
    fn test_strip_framing_sse_multiline_event() {
        let raw = "event: delta\ndata: line one\ndata: line two\n\n";
        assert_eq!(strip_framing(raw), "line one\nline two");
    }

    #[test]
    fn test_strip_framing_sse_done_sentinel() {
        assert_eq!(strip_framing("data: tail\n\ndata: [DONE]\n\n"), "tail");
    }

    #[test]
    fn test_strip_framing_keeps_leading_space_in_payload() {
        // Only the single space after the colon is framing
        assert_eq!(strip_framing("data:  indented\n\n"), " indented");
    }

    #[test]
    fn test_displayable_text_filters_filler() {
        assert_eq!(displayable_text("..."), None);
        assert_eq!(displayable_text("  …  "), None);
        assert_eq!(displayable_text("⠋"), None);
        assert_eq!(displayable_text("\n\n"), None);
        assert_eq!(displayable_text(""), None);
    }

    #[test]
    fn test_displayable_text_filters_code_fences() {
        assert_eq!(displayable_text("```json\n"), None);
        assert_eq!(
            displayable_text("Here is the plan:\n```json\n").as_deref(),
            Some("Here is the plan:\n")
        );
    }

    #[test]
    fn test_displayable_text_keeps_spacing() {
        assert_eq!(displayable_text(" world").as_deref(), Some(" world"));
        assert_eq!(
            displayable_text("Wait... what?").as_deref(),
            Some("Wait... what?")
        );
    }
}
