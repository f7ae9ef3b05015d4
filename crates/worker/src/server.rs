//! Request loop - reads terms from a stream, answers on another
//!
//! Design decisions:
//! 1. One JSON term per line in both directions. Input lines are raw byte
//!    frames: a line that is not UTF-8 or not JSON is dropped, never fatal
//! 2. Each request runs on the blocking pool with its own workspace
//! 3. Responses are written as they complete, not in request order
//! 4. At most `max_concurrency` requests execute at once; input is not read
//!    while the limit is reached
//! 5. A panicking request is logged and dropped; the loop keeps serving

use dom::{Engine, Query};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::events::WorkerEvent;
use crate::term::Term;

/// Counters reported when the input stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Requests answered, successfully or with an error term
    pub handled: u64,
    /// Lines that were not a recognized request
    pub ignored: u64,
    /// Requests abandoned because the pipeline panicked
    pub panicked: u64,
}

/// Serve requests from `reader` until end of input, then wait for every
/// in-flight request and return.
pub async fn serve<R, W, E>(
    reader: R,
    mut writer: W,
    dispatcher: Arc<Dispatcher<E>>,
    max_concurrency: usize,
) -> Result<ServeStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: Engine + 'static,
{
    let max_concurrency = max_concurrency.max(1);
    let mut frames = BufReader::new(reader).split(b'\n');
    let mut in_flight: JoinSet<Option<Term>> = JoinSet::new();
    let mut stats = ServeStats::default();
    let mut input_open = true;

    loop {
        tokio::select! {
            frame = frames.next_segment(), if input_open && in_flight.len() < max_concurrency => {
                let Some(frame) = frame? else {
                    tracing::debug!("Input closed, draining {} requests", in_flight.len());
                    input_open = false;
                    continue;
                };

                match accept_frame(&dispatcher, &frame) {
                    Some(query) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        in_flight.spawn_blocking(move || run_request(&dispatcher, query));
                    }
                    None => stats.ignored += 1,
                }
            }
            Some(joined) = in_flight.join_next() => {
                match joined {
                    Ok(Some(response)) => {
                        write_term(&mut writer, &response).await?;
                        stats.handled += 1;
                    }
                    Ok(None) => stats.panicked += 1,
                    Err(e) => {
                        tracing::error!("Request task failed: {}", e);
                        stats.panicked += 1;
                    }
                }
            }
            else => break,
        }
    }

    tracing::info!(
        handled = stats.handled,
        ignored = stats.ignored,
        panicked = stats.panicked,
        "Request loop finished"
    );

    Ok(stats)
}

/// Parse and decode one input line, without its newline
fn accept_frame<E: Engine>(dispatcher: &Dispatcher<E>, frame: &[u8]) -> Option<Query> {
    if frame.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }

    match serde_json::from_slice::<Term>(frame) {
        Ok(term) => dispatcher.accept(term),
        Err(e) => {
            tracing::warn!("Dropping malformed input line: {}", e);
            dispatcher.events().publish(WorkerEvent::RequestIgnored);
            None
        }
    }
}

/// Execute one request on the current thread. `None` if it panicked.
fn run_request<E: Engine>(dispatcher: &Dispatcher<E>, query: Query) -> Option<Term> {
    let request_id = Uuid::now_v7();
    let kind = query.kind();
    let span = tracing::debug_span!("request", request_id = %request_id, kind = kind);
    let _enter = span.enter();

    match catch_unwind(AssertUnwindSafe(|| dispatcher.execute(request_id, &query))) {
        Ok(response) => Some(response),
        Err(_) => {
            tracing::error!("Request panicked, no response sent");
            dispatcher.events().publish(WorkerEvent::RequestPanicked {
                request_id,
                kind: kind.to_string(),
            });
            None
        }
    }
}

/// Write one term as a JSON line
async fn write_term<W: AsyncWrite + Unpin>(writer: &mut W, term: &Term) -> Result<()> {
    let mut line = serde_json::to_vec(term)?;
    line.push(b'\n');

    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
