//! HTML query workspace
//!
//! Parses documents, resolves selectors inside a scope, removes matched
//! nodes and serializes the result, all through handles into a per-request
//! resource arena.
//!
//! ## Core Design
//!
//! ```text
//! bytes → Workspace::allocate_tree ──┐
//!                                    ├→ CollectionHandle → remove → serialize → join → String
//! bytes → Workspace::allocate_selector┘
//!              │
//!        Engine (scraper / html5ever), shared read-only across requests
//! ```
//!
//! One `Workspace` lives for exactly one query and is destroyed on every
//! exit path. `QueryService` owns the engine and composes the pipelines.

pub mod arena;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod serializer;
pub mod types;
pub mod utils;
pub mod workspace;

pub use engine::{Engine, EngineConfig, ScraperEngine};
pub use error::{DomError, Result, GENERIC_REMOVE_REASON};
pub use pipeline::QueryService;
pub use types::*;
pub use workspace::Workspace;
