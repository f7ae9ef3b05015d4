//! Worker configuration
//!
//! Loaded once at startup from an optional JSON file. Every field has a
//! default, so an empty object (or no file at all) is a valid configuration.

use dom::{EngineConfig, QueryService, ScraperEngine};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dispatcher::Dispatcher;
use crate::error::{Result, WorkerError};
use crate::events::EventBus;

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// WHATWG label of the document encoding
    pub encoding: String,
    pub lossy_decoding: bool,
    pub max_document_bytes: usize,
    /// Requests executing at the same time
    pub max_concurrency: usize,
    /// Report per-kind reasons for Remove failures
    pub detailed_errors: bool,
    pub log_level: String,
    /// Unread lifecycle events kept per subscriber
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();

        Self {
            encoding: "utf-8".to_string(),
            lossy_decoding: engine.lossy_decoding,
            max_document_bytes: engine.max_document_bytes,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            detailed_errors: false,
            log_level: "info".to_string(),
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Read configuration from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(WorkerError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(WorkerError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        self.encoding()?;
        self.log_level()?;
        Ok(())
    }

    /// Resolve the encoding label
    pub fn encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| WorkerError::Config(format!("unknown encoding: {}", self.encoding)))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lossy_decoding: self.lossy_decoding,
            max_document_bytes: self.max_document_bytes,
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse()
            .map_err(|_| WorkerError::Config(format!("unknown log level: {}", self.log_level)))
    }

    /// Build the request dispatcher this configuration describes
    pub fn build_dispatcher(&self) -> Result<Dispatcher<ScraperEngine>> {
        let engine = ScraperEngine::new(self.engine_config());
        let service = QueryService::with_encoding(engine, self.encoding()?);

        Ok(Dispatcher::new(service)
            .with_detailed_errors(self.detailed_errors)
            .with_event_capacity(self.event_capacity))
    }
}
