//! Recording and replay of response streams.
//!
//! A [`CaptureSession`] is created explicitly and handed to the pipeline; it
//! keeps the raw fragments of every response it is told about. Finished
//! captures stay in memory and, when a directory is configured, are written
//! as `<id>.json` so they can be fed back through a pipeline later.

use crate::error::CoursegenError;
use crate::pipeline::{BeginResponse, CoursePipeline};
use crate::Result;
use coursegen_types::{now_ms, ResponseCapture, ResponsePhase};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capture settings.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Where finished captures are written. `None` keeps them in memory only.
    pub dir: Option<PathBuf>,
    pub enabled: bool,
}

impl CaptureConfig {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            enabled: true,
        }
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            enabled: true,
        }
    }
}

#[derive(Debug)]
struct ActiveCapture {
    capture: ResponseCapture,
    started: Instant,
}

/// Records response streams for later replay.
#[derive(Debug)]
pub struct CaptureSession {
    config: CaptureConfig,
    active: Mutex<HashMap<Uuid, ActiveCapture>>,
    finished: Mutex<Vec<ResponseCapture>>,
    disposed: AtomicBool,
}

impl CaptureSession {
    /// Create a session, making the capture directory if needed.
    pub fn create(config: CaptureConfig) -> Result<Self> {
        if config.enabled {
            if let Some(dir) = &config.dir {
                std::fs::create_dir_all(dir)?;
                info!(target: "coursegen::capture", "Capturing responses to {}", dir.display());
            }
        }

        Ok(Self {
            config,
            active: Mutex::new(HashMap::new()),
            finished: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn is_recording(&self) -> bool {
        self.config.enabled && !self.disposed.load(Ordering::Acquire)
    }

    /// Stop recording and drop captures still in progress. Returns how many
    /// were dropped.
    pub async fn dispose(&self) -> usize {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut active = self.active.lock().await;
        let dropped = active.len();
        active.clear();
        debug!(target: "coursegen::capture", "Capture session disposed, {} in-progress capture(s) dropped", dropped);
        dropped
    }

    /// Start recording a response.
    pub async fn begin(&self, id: Uuid, user_prompt: Option<String>, model: Option<String>) {
        if !self.is_recording() {
            return;
        }
        let capture = ResponseCapture {
            id,
            timestamp: now_ms(),
            user_prompt: user_prompt.unwrap_or_default(),
            model: model.unwrap_or_default(),
            chunks: Vec::new(),
            full_response: String::new(),
            duration_ms: 0,
            error: None,
        };
        self.active.lock().await.insert(
            id,
            ActiveCapture {
                capture,
                started: Instant::now(),
            },
        );
    }

    /// Append a raw fragment to a response being recorded.
    pub async fn record_chunk(&self, id: Uuid, raw: &str) {
        if !self.is_recording() {
            return;
        }
        if let Some(active) = self.active.lock().await.get_mut(&id) {
            active.capture.chunks.push(raw.to_string());
        }
    }

    /// Close a capture after normal completion.
    pub async fn finish(&self, id: Uuid, final_text: &str) -> Result<Option<ResponseCapture>> {
        self.close(id, final_text, None).await
    }

    /// Close a capture after a transport failure. The capture is kept.
    pub async fn fail(&self, id: Uuid, message: &str) -> Result<Option<ResponseCapture>> {
        self.close(id, "", Some(message.to_string())).await
    }

    /// Drop a capture without keeping it.
    pub async fn abandon(&self, id: Uuid) -> bool {
        let removed = self.active.lock().await.remove(&id).is_some();
        if removed {
            debug!(target: "coursegen::capture", "Abandoned capture {}", id);
        }
        removed
    }

    async fn close(
        &self,
        id: Uuid,
        final_text: &str,
        error: Option<String>,
    ) -> Result<Option<ResponseCapture>> {
        let Some(ActiveCapture { mut capture, started }) = self.active.lock().await.remove(&id) else {
            return Ok(None);
        };

        capture.full_response = if final_text.is_empty() {
            capture.joined_chunks()
        } else {
            final_text.to_string()
        };
        capture.duration_ms = started.elapsed().as_millis() as u64;
        capture.error = error;

        // Kept in memory even if the file write below fails
        self.finished.lock().await.push(capture.clone());

        if let Some(dir) = &self.config.dir {
            let path = capture_path(dir, id);
            let json = serde_json::to_string_pretty(&capture)?;
            tokio::fs::write(&path, json).await?;
            debug!(target: "coursegen::capture", "Wrote capture {}", path.display());
        }

        Ok(Some(capture))
    }

    /// Finished captures, oldest first.
    pub async fn captures(&self) -> Vec<ResponseCapture> {
        self.finished.lock().await.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

/// File a capture is written to.
pub fn capture_path(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Read a capture file.
pub async fn load(path: impl AsRef<Path>) -> Result<ResponseCapture> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&json)
        .map_err(|e| CoursegenError::Capture(format!("{}: {}", path.display(), e)))
}

/// Feed a capture through a pipeline, fragment by fragment, then close the
/// response the way the original stream ended. Returns the final phase.
pub async fn replay(pipeline: &CoursePipeline, capture: &ResponseCapture) -> Result<ResponsePhase> {
    let id = capture.id;
    let mut begin = BeginResponse::new(id);
    if !capture.user_prompt.is_empty() {
        begin = begin.with_prompt(capture.user_prompt.clone());
    }
    if !capture.model.is_empty() {
        begin = begin.with_model(capture.model.clone());
    }
    pipeline.begin_response(begin).await?;

    info!(target: "coursegen::capture", "Replaying capture {} ({} chunks)", id, capture.chunks.len());
    for chunk in &capture.chunks {
        pipeline.on_chunk(id, chunk).await?;
    }

    match &capture.error {
        Some(message) => {
            warn!(target: "coursegen::capture", "Replayed capture {} ended with error: {}", id, message);
            pipeline.on_error(id, message).await?;
        }
        None => {
            pipeline.on_complete(id, &capture.full_response).await?;
        }
    }

    pipeline.phase(id).await.ok_or(CoursegenError::ResponseNotFound(id))
}
