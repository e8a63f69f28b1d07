//! Course content tree types.
//!
//! The tree is a strict hierarchy: a Course holds Subjects, a Subject holds
//! Modules, a Module holds Chapters and a Chapter holds Slides. Every node is
//! addressed by a dot-separated path of type-prefixed segments such as
//! `C1.S1.M2.CH1.SL3`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Slide type that gets grouped at the front of a chapter.
pub const VIDEO_SLIDE_TYPE: &str = "video";

/// Level of a node in the content hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    #[serde(alias = "course", alias = "Course")]
    Course,
    #[serde(alias = "subject", alias = "Subject")]
    Subject,
    #[serde(alias = "module", alias = "Module")]
    Module,
    #[serde(alias = "chapter", alias = "Chapter")]
    Chapter,
    #[serde(alias = "slide", alias = "Slide")]
    Slide,
}

impl NodeType {
    /// All levels, root first.
    pub const ALL: [NodeType; 5] = [
        NodeType::Course,
        NodeType::Subject,
        NodeType::Module,
        NodeType::Chapter,
        NodeType::Slide,
    ];

    /// Lowercase label used in task titles and placeholder names.
    pub fn label(self) -> &'static str {
        match self {
            NodeType::Course => "course",
            NodeType::Subject => "subject",
            NodeType::Module => "module",
            NodeType::Chapter => "chapter",
            NodeType::Slide => "slide",
        }
    }

    /// Capitalized label.
    pub fn title(self) -> &'static str {
        match self {
            NodeType::Course => "Course",
            NodeType::Subject => "Subject",
            NodeType::Module => "Module",
            NodeType::Chapter => "Chapter",
            NodeType::Slide => "Slide",
        }
    }

    /// Depth of this level (Course = 0).
    pub fn depth(self) -> usize {
        self as usize
    }

    /// Level at a given depth, if any.
    pub fn at_depth(depth: usize) -> Option<NodeType> {
        Self::ALL.get(depth).copied()
    }

    /// The only level this one may hold as children.
    pub fn child_type(self) -> Option<NodeType> {
        Self::at_depth(self.depth() + 1)
    }

    /// Whether a node of this type may directly contain `child`.
    pub fn can_contain(self, child: NodeType) -> bool {
        self.child_type() == Some(child)
    }

    /// Infer the level from a path segment's prefix.
    ///
    /// Two-letter prefixes are checked first so `CH1` is a Chapter, not a
    /// Course, and `SL1` is a Slide, not a Subject. The rest of the segment
    /// must be non-empty and must not start with a letter, so `Setup` does not
    /// read as a Subject.
    pub fn from_segment(segment: &str) -> Option<NodeType> {
        const BY_PREFIX: [(&str, NodeType); 5] = [
            ("CH", NodeType::Chapter),
            ("SL", NodeType::Slide),
            ("C", NodeType::Course),
            ("S", NodeType::Subject),
            ("M", NodeType::Module),
        ];

        BY_PREFIX.iter().find_map(|(prefix, node_type)| {
            let rest = segment.strip_prefix(prefix)?;
            let first = rest.chars().next()?;
            (!first.is_ascii_alphabetic()).then_some(*node_type)
        })
    }

    /// Parse a target type name leniently (`MODULE`, `module`, `Module`).
    pub fn parse_lenient(name: &str) -> Option<NodeType> {
        Self::ALL
            .into_iter()
            .find(|t| t.title().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Split a path into its segments, ignoring empty ones.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Append a segment to a parent path.
pub fn join_path(parent: Option<&str>, segment: &str) -> String {
    match parent.map(str::trim).filter(|p| !p.is_empty()) {
        Some(parent) => format!("{parent}{PATH_SEPARATOR}{segment}"),
        None => segment.to_string(),
    }
}

/// A node in the course content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_type: Option<String>,
    /// Any other fields supplied by modifications.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    /// Synthesized during path resolution and not yet filled in by a real ADD.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
    #[serde(default)]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    /// Create a node with no children.
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            path: path.into(),
            description: None,
            slide_type: None,
            attributes: BTreeMap::new(),
            placeholder: false,
            children: Vec::new(),
        }
    }

    /// Create a placeholder ancestor for a path segment.
    pub fn placeholder(segment: &str, node_type: NodeType, path: impl Into<String>) -> Self {
        let mut node = Self::new(segment, format!("{} {}", node_type.title(), segment), node_type, path);
        node.placeholder = true;
        node
    }

    /// Whether this is a video slide.
    pub fn is_video(&self) -> bool {
        self.node_type == NodeType::Slide
            && self.slide_type.as_deref() == Some(VIDEO_SLIDE_TYPE)
    }

    /// Find a direct child by id.
    pub fn child(&self, id: &str) -> Option<&ContentNode> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Number of nodes in this subtree, self included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ContentNode::subtree_len).sum::<usize>()
    }

    fn collect_paths(&self, out: &mut BTreeSet<String>) {
        out.insert(self.path.clone());
        for child in &self.children {
            child.collect_paths(out);
        }
    }
}

/// The full course hierarchy: an ordered list of root courses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTree {
    #[serde(default)]
    pub roots: Vec<ContentNode>,
}

impl ContentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(ContentNode::subtree_len).sum()
    }

    /// Every node path in the tree.
    pub fn paths(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for root in &self.roots {
            root.collect_paths(&mut out);
        }
        out
    }

    /// Whether a node exists at `path`.
    pub fn contains_path(&self, path: &str) -> bool {
        self.find_by_path(path).is_some()
    }

    /// Walk the tree segment by segment.
    pub fn find_by_path(&self, path: &str) -> Option<&ContentNode> {
        let mut segments = path_segments(path);
        let first = segments.next()?;
        let mut node = self.roots.iter().find(|r| r.id == first)?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }
}
