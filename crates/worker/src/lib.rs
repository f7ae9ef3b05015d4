//! Query Worker - serves HTML queries over a term stream
//!
//! Wraps the `dom` query pipelines in a long-running process: requests come
//! in as tagged tuples, each runs in its own workspace on the blocking pool,
//! and the outcome goes back as a tagged tuple.
//!
//! # Architecture
//!
//! 1. **Terms on the wire**: one JSON term per line, binaries base64 encoded
//! 2. **Dispatcher decides shape**: unrecognized requests never get a reply
//! 3. **Shared engine, private workspaces**: requests never see each other's
//!    resources

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod server;
pub mod term;

pub use config::WorkerConfig;
pub use dispatcher::{decode_request, Dispatcher};
pub use error::{Result, WorkerError};
pub use events::{EventBus, WorkerEvent};
pub use server::{serve, ServeStats};
pub use term::Term;
