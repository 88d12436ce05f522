//! The orchestrator: a strict linear pipeline per invocation.
//!
//! `Init → (exists?) → download → upload → Done`, or any step → failed.
//! The download and upload legs never hold the full payload; they are
//! connected through one bounded, backpressured byte channel and driven
//! concurrently within the same task.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::download::{self, DEFAULT_CONTENT_TYPE};
use crate::error::Result;
use crate::relay::{self, ByteCounter};
use crate::request::{TransferRequest, TransferResult};
use crate::store::{self, ObjectStore};

/// Run one transfer end to end and return the result, or the first terminal
/// error.  No partial result is ever produced: either both legs succeeded
/// (or the skip path was taken), or this returns an error.
pub async fn run<S: ObjectStore>(req: &TransferRequest, store: &S) -> Result<TransferResult> {
    // bad enumerated options are a configuration error; surface it before
    // any request goes out
    store::validate_options(&req.upload)?;

    // the check precedes the download, so a skipped transfer costs no
    // bandwidth at all
    if req.if_not_exists && store.exists(&req.destination).await? {
        info!(dest = %req.destination.url(), "object already exists; skipping transfer");
        return Ok(TransferResult::skipped(&req.destination));
    }

    let outcome = download::fetch(req).await?;
    let content_type = req
        .content_type
        .clone()
        .or_else(|| outcome.content_type.clone())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let counter = ByteCounter::default();
    let (tx, rx) = mpsc::channel(relay::CHANNEL_CAPACITY);
    let pumped = relay::pump(outcome.body, counter.clone(), tx);
    let put = store.put(
        &req.destination,
        ReceiverStream::new(rx),
        outcome.declared_length,
        &content_type,
        &req.upload,
    );
    let (pumped, stored) = tokio::join!(pumped, put);

    // a network failure mid-stream is the root cause of any storage failure
    // it triggers, so it takes precedence
    pumped?;
    let stored = stored?;

    let transferred = counter.total();
    if outcome.declared_length != 0 && outcome.declared_length != transferred {
        // encoded and decoded body sizes legitimately differ; informational only
        warn!(
            declared = outcome.declared_length,
            transferred, "Content-Length differs from relayed byte count"
        );
    }
    info!(bytes = transferred, dest = %stored.url, "transfer complete");

    Ok(TransferResult {
        status_code: outcome.status,
        bytes_transferred: transferred,
        url: stored.url,
        e_tag: stored.e_tag,
        existed_already: false,
    })
}
