//! Multi-response pipeline manager.
//!
//! Architecture:
//! - Each response id owns a [`ResponseStream`] (buffer, status, seen keys)
//! - The content tree is shared; every mutation swaps in a new `Arc` snapshot
//! - Tasks are derived from new modifications and reconciled after mutation
//! - Everything a fragment produces is broadcast as [`PipelineEvent`]s
//!
//! Locks are always taken in the order responses, tree, tasks, sections. The
//! responses lock is held for the whole fragment, so superseding a response
//! cannot interleave with one of its fragments.
//!
//! Ended responses keep only their summary and section log. The oldest are
//! evicted once more than the retention limit have ended.

use crate::capture::CaptureSession;
use crate::error::CoursegenError;
use crate::sections::SectionAccumulator;
use crate::stream::{FragmentOutput, ResponseStream};
use crate::tasks::{derive_tasks, TaskTracker};
use crate::tree;
use crate::Result;
use chrono::{DateTime, Utc};
use coursegen_types::{
    ContentTree, ModificationKey, PipelineEvent, ProcessingStatus, ResponsePhase, Section,
    StreamSignal, TodoTask,
};
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default number of ended responses kept for reading.
pub const DEFAULT_RETAINED_RESPONSES: usize = 64;

/// Request to open a new response stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginResponse {
    pub id: Uuid,
    /// Earlier response this one replaces (regenerate).
    pub supersedes: Option<Uuid>,
    pub prompt: Option<String>,
    pub model: Option<String>,
}

impl BeginResponse {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            supersedes: None,
            prompt: None,
            model: None,
        }
    }

    pub fn superseding(mut self, previous: Uuid) -> Self {
        self.supersedes = Some(previous);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// What processing one fragment did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkOutcome {
    pub status: ProcessingStatus,
    pub sections: Vec<Section>,
    /// Keys of modifications that changed or matched the tree.
    pub applied: Vec<ModificationKey>,
    pub tree_revision: u64,
    pub tasks_changed: bool,
}

/// Snapshot of one response's state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub id: Uuid,
    pub phase: ResponsePhase,
    pub status: ProcessingStatus,
    pub fragments: usize,
    pub received_bytes: usize,
    pub sections: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response streams plus the order in which they ended.
#[derive(Debug, Default)]
struct ResponseTable {
    streams: HashMap<Uuid, ResponseStream>,
    ended: VecDeque<Uuid>,
}

impl ResponseTable {
    /// Record that a stream ended. Returns the ids evicted to stay within
    /// `retain` ended streams.
    fn retire(&mut self, id: Uuid, retain: usize) -> Vec<Uuid> {
        self.ended.push_back(id);
        let mut evicted = Vec::new();
        while self.ended.len() > retain {
            let Some(oldest) = self.ended.pop_front() else {
                break;
            };
            self.streams.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    fn remove(&mut self, id: Uuid) -> Option<ResponseStream> {
        self.ended.retain(|ended| *ended != id);
        self.streams.remove(&id)
    }
}

#[derive(Debug, Default)]
struct TreeState {
    snapshot: Arc<ContentTree>,
    revision: u64,
}

/// Routes stream fragments into sections, tree mutations and tasks.
pub struct CoursePipeline {
    responses: RwLock<ResponseTable>,
    tree: RwLock<TreeState>,
    tasks: RwLock<TaskTracker>,
    sections: RwLock<SectionAccumulator>,
    capture: Option<Arc<CaptureSession>>,
    retain: usize,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl Default for CoursePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl CoursePipeline {
    pub fn new(event_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        Self {
            responses: RwLock::new(ResponseTable::default()),
            tree: RwLock::new(TreeState::default()),
            tasks: RwLock::new(TaskTracker::new()),
            sections: RwLock::new(SectionAccumulator::new()),
            capture: None,
            retain: DEFAULT_RETAINED_RESPONSES,
            event_tx,
        }
    }

    /// Record every response through `capture`.
    pub fn with_capture(mut self, capture: Arc<CaptureSession>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Keep at most `limit` ended responses (at least one).
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retain = limit.max(1);
        self
    }

    pub fn capture(&self) -> Option<&Arc<CaptureSession>> {
        self.capture.as_ref()
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, events: Vec<PipelineEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }

    /// Open a response stream, cancelling the one it supersedes.
    pub async fn begin_response(&self, request: BeginResponse) -> Result<()> {
        let id = request.id;
        let mut events = Vec::new();
        let mut responses = self.responses.write().await;

        if responses.streams.contains_key(&id) {
            return Err(CoursegenError::ResponseAlreadyExists(id));
        }

        let mut evicted = Vec::new();
        if let Some(previous) = request.supersedes {
            match responses.streams.get_mut(&previous) {
                Some(stream) => {
                    if stream.supersede(id) {
                        evicted = responses.retire(previous, self.retain);
                        info!(target: "coursegen::stream", "Response {} superseded by {}", previous, id);
                        if let Some(capture) = &self.capture {
                            capture.abandon(previous).await;
                        }
                        events.push(PipelineEvent::ResponseSuperseded {
                            response_id: previous,
                            by: id,
                        });
                    } else {
                        debug!(target: "coursegen::stream", "Response {} already {}, nothing to supersede", previous, stream.phase());
                    }
                }
                None => {
                    debug!(target: "coursegen::stream", "Superseded response {} is unknown", previous);
                }
            }
        }

        responses.streams.insert(id, ResponseStream::new(id));
        if let Some(capture) = &self.capture {
            capture.begin(id, request.prompt, request.model).await;
        }
        self.forget_sections(&evicted).await;
        drop(responses);

        info!(target: "coursegen::stream", "Response {} started", id);
        events.push(PipelineEvent::ResponseStarted {
            response_id: id,
            supersedes: request.supersedes,
        });
        self.broadcast(events);
        Ok(())
    }

    /// Process one raw fragment of a response.
    pub async fn on_chunk(&self, id: Uuid, raw: &str) -> Result<ChunkOutcome> {
        let mut responses = self.responses.write().await;
        let stream = responses
            .streams
            .get_mut(&id)
            .ok_or(CoursegenError::ResponseNotFound(id))?;

        // Stale fragments stop here, before any processing
        if let Err(e) = stream.ensure_open() {
            debug!(target: "coursegen::stream", "Dropping fragment for {}: {}", id, e);
            return Err(e);
        }

        if let Some(capture) = &self.capture {
            capture.record_chunk(id, raw).await;
        }

        let output = stream.ingest(raw)?;
        let (outcome, events) = self.commit(id, output).await;
        drop(responses);

        self.broadcast(events);
        Ok(outcome)
    }

    /// Close a response normally, processing any final text not yet seen.
    pub async fn on_complete(&self, id: Uuid, final_text: &str) -> Result<ChunkOutcome> {
        let mut responses = self.responses.write().await;
        let stream = responses
            .streams
            .get_mut(&id)
            .ok_or(CoursegenError::ResponseNotFound(id))?;

        let output = stream.finish(final_text)?;
        let fragments = stream.fragments();
        let (outcome, mut events) = self.commit(id, output).await;
        let evicted = responses.retire(id, self.retain);
        self.forget_sections(&evicted).await;

        if let Some(capture) = &self.capture {
            if let Err(e) = capture.finish(id, final_text).await {
                warn!(target: "coursegen::capture", "Failed to save capture {}: {}", id, e);
            }
        }
        drop(responses);

        info!(target: "coursegen::stream", "Response {} complete after {} fragment(s)", id, fragments);
        events.push(PipelineEvent::ResponseComplete { response_id: id });
        self.broadcast(events);
        Ok(outcome)
    }

    /// Close a response after a transport failure.
    pub async fn on_error(&self, id: Uuid, message: &str) -> Result<()> {
        let mut responses = self.responses.write().await;
        let stream = responses
            .streams
            .get_mut(&id)
            .ok_or(CoursegenError::ResponseNotFound(id))?;

        stream.fail(message)?;
        let evicted = responses.retire(id, self.retain);
        self.forget_sections(&evicted).await;

        if let Some(capture) = &self.capture {
            if let Err(e) = capture.fail(id, message).await {
                warn!(target: "coursegen::capture", "Failed to save capture {}: {}", id, e);
            }
        }
        drop(responses);

        warn!(target: "coursegen::stream", "Response {} failed: {}", id, message);
        self.broadcast(vec![PipelineEvent::ResponseFailed {
            response_id: id,
            message: message.to_string(),
        }]);
        Ok(())
    }

    /// Drop the section logs of evicted responses.
    ///
    /// Called with the responses lock held.
    async fn forget_sections(&self, evicted: &[Uuid]) {
        if evicted.is_empty() {
            return;
        }
        let mut sections = self.sections.write().await;
        for id in evicted {
            sections.forget(*id);
            debug!(target: "coursegen::stream", "Evicted ended response {}", id);
        }
    }

    /// Apply a fragment's output to the shared state.
    ///
    /// Called with the responses lock held.
    async fn commit(&self, id: Uuid, output: FragmentOutput) -> (ChunkOutcome, Vec<PipelineEvent>) {
        let mut events = Vec::new();
        if let Some(status) = output.entered {
            events.push(PipelineEvent::StatusChanged {
                response_id: id,
                status,
            });
        }

        let mut applied = Vec::new();
        let mut tree_event = None;
        let mut tasks_event = None;
        let tree_revision;
        {
            let mut tree = self.tree.write().await;

            if !output.modifications.is_empty() {
                let result = tree::apply(&tree.snapshot, &output.modifications);
                applied = result.applied_keys();

                if result.tree != *tree.snapshot {
                    tree.snapshot = Arc::new(result.tree);
                    tree.revision += 1;
                    info!(
                        target: "coursegen::tree",
                        "Tree revision {} ({} node(s)) after response {}",
                        tree.revision,
                        tree.snapshot.node_count(),
                        id
                    );
                    tree_event = Some(PipelineEvent::TreeUpdated {
                        response_id: id,
                        revision: tree.revision,
                        applied: applied.clone(),
                        tree: Arc::clone(&tree.snapshot),
                    });
                }

                let mut tasks = self.tasks.write().await;
                let added = tasks.ingest(derive_tasks(&output.modifications));
                let completed = tasks.reconcile_with(&tree.snapshot);
                if added > 0 || completed {
                    tasks_event = Some(PipelineEvent::TasksUpdated {
                        tasks: tasks.tasks().to_vec(),
                    });
                }
            }
            tree_revision = tree.revision;
        }

        let mut appended = Vec::with_capacity(output.drafts.len());
        {
            let mut sections = self.sections.write().await;
            for draft in output.drafts {
                appended.push(sections.append(id, draft));
            }
        }

        events.extend(appended.iter().map(|section| PipelineEvent::Section {
            response_id: id,
            section: section.clone(),
        }));
        let tasks_changed = tasks_event.is_some();
        events.extend(tree_event);
        events.extend(tasks_event);

        let outcome = ChunkOutcome {
            status: output.status,
            sections: appended,
            applied,
            tree_revision,
            tasks_changed,
        };
        (outcome, events)
    }

    /// Consume a stream of signals for one response, in order.
    ///
    /// A stream that ends without a terminal signal completes the response.
    /// Returns the response's final phase.
    pub async fn drive<S>(&self, id: Uuid, signals: S) -> Result<ResponsePhase>
    where
        S: Stream<Item = StreamSignal>,
    {
        pin_mut!(signals);

        while let Some(signal) = signals.next().await {
            match signal {
                StreamSignal::Chunk(text) => {
                    self.on_chunk(id, &text).await?;
                }
                StreamSignal::Complete(text) => {
                    self.on_complete(id, &text).await?;
                    return Ok(ResponsePhase::Complete);
                }
                StreamSignal::Error(message) => {
                    self.on_error(id, &message).await?;
                    return Ok(ResponsePhase::Error);
                }
            }
        }

        debug!(target: "coursegen::stream", "Signal stream for {} ended without completion", id);
        self.on_complete(id, "").await?;
        Ok(ResponsePhase::Complete)
    }

    /// [`drive`](Self::drive) with a deadline. On expiry the response is
    /// failed as a transport timeout.
    pub async fn drive_with_timeout<S>(&self, id: Uuid, signals: S, limit: Duration) -> Result<ResponsePhase>
    where
        S: Stream<Item = StreamSignal>,
    {
        match tokio::time::timeout(limit, self.drive(id, signals)).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("stream timed out after {}s", limit.as_secs());
                self.on_error(id, &message).await?;
                Ok(ResponsePhase::Error)
            }
        }
    }

    /// Fail a response that is still receiving. Returns false if it had
    /// already ended.
    pub async fn expire(&self, id: Uuid, message: &str) -> Result<bool> {
        match self.on_error(id, message).await {
            Ok(()) => Ok(true),
            Err(CoursegenError::ResponseClosed { .. } | CoursegenError::ResponseSuperseded { .. }) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    /// Sections of a response, in emission order.
    pub async fn sections(&self, id: Uuid) -> Result<Vec<Section>> {
        self.sections_since(id, 0).await
    }

    /// Sections from index `offset` onward.
    pub async fn sections_since(&self, id: Uuid, offset: usize) -> Result<Vec<Section>> {
        let responses = self.responses.read().await;
        if !responses.streams.contains_key(&id) {
            return Err(CoursegenError::ResponseNotFound(id));
        }
        Ok(self.sections.read().await.sections_since(id, offset))
    }

    /// Current tree snapshot.
    pub async fn tree(&self) -> Arc<ContentTree> {
        Arc::clone(&self.tree.read().await.snapshot)
    }

    /// Bumped every time the tree changes.
    pub async fn tree_revision(&self) -> u64 {
        self.tree.read().await.revision
    }

    /// Tree snapshot together with its revision.
    pub async fn tree_snapshot(&self) -> (Arc<ContentTree>, u64) {
        let tree = self.tree.read().await;
        (Arc::clone(&tree.snapshot), tree.revision)
    }

    pub async fn tasks(&self) -> Vec<TodoTask> {
        self.tasks.read().await.tasks().to_vec()
    }

    pub async fn phase(&self, id: Uuid) -> Option<ResponsePhase> {
        self.responses.read().await.streams.get(&id).map(ResponseStream::phase)
    }

    pub async fn processing_status(&self, id: Uuid) -> Option<ProcessingStatus> {
        self.responses.read().await.streams.get(&id).map(ResponseStream::status)
    }

    /// Summary of one response.
    pub async fn response(&self, id: Uuid) -> Option<ResponseSummary> {
        let responses = self.responses.read().await;
        let stream = responses.streams.get(&id)?;
        let sections = self.sections.read().await.len(id);
        Some(summarize(stream, sections))
    }

    /// Summaries of all known responses, oldest first.
    pub async fn responses(&self) -> Vec<ResponseSummary> {
        let responses = self.responses.read().await;
        let sections = self.sections.read().await;
        let mut all: Vec<_> = responses
            .streams
            .values()
            .map(|stream| summarize(stream, sections.len(stream.id())))
            .collect();
        all.sort_by_key(|s| s.started_at);
        all
    }

    /// Normalized text buffered for a response still receiving.
    pub async fn buffer(&self, id: Uuid) -> Result<String> {
        self.responses
            .read()
            .await
            .streams
            .get(&id)
            .map(|stream| stream.buffer().to_string())
            .ok_or(CoursegenError::ResponseNotFound(id))
    }

    /// Drop an ended response and its sections.
    pub async fn forget_response(&self, id: Uuid) -> Result<()> {
        let mut responses = self.responses.write().await;
        let stream = responses
            .streams
            .get(&id)
            .ok_or(CoursegenError::ResponseNotFound(id))?;
        if !stream.phase().is_terminal() {
            return Err(CoursegenError::ResponseActive(id));
        }

        responses.remove(id);
        self.sections.write().await.forget(id);
        info!(target: "coursegen::stream", "Forgot response {}", id);
        Ok(())
    }

    /// Complete a task by hand.
    pub async fn mark_task_done(&self, task_id: &str) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let changed = tasks.mark_done(task_id)?;
        let snapshot = changed.then(|| tasks.tasks().to_vec());
        drop(tasks);

        if let Some(tasks) = snapshot {
            self.broadcast(vec![PipelineEvent::TasksUpdated { tasks }]);
        }
        Ok(changed)
    }
}

fn summarize(stream: &ResponseStream, sections: usize) -> ResponseSummary {
    ResponseSummary {
        id: stream.id(),
        phase: stream.phase(),
        status: stream.status(),
        fragments: stream.fragments(),
        received_bytes: stream.received_bytes(),
        sections,
        started_at: stream.started_at(),
        finished_at: stream.finished_at(),
        superseded_by: stream.superseded_by(),
        error: stream.error().map(str::to_string),
    }
}
