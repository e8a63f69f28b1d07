//! Shared application state.

use crate::config::Config;
use coursegen_core::{CaptureSession, CoursePipeline};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub pipeline: Arc<CoursePipeline>,
    pub captures: Arc<CaptureSession>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> coursegen_core::Result<Self> {
        let captures = Arc::new(CaptureSession::create(config.capture_config())?);
        let pipeline = Arc::new(
            CoursePipeline::new(config.event_buffer)
                .with_retention(config.retained_responses)
                .with_capture(Arc::clone(&captures)),
        );

        Ok(Self {
            pipeline,
            captures,
            config,
        })
    }
}
