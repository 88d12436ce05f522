/*! Stream content from an HTTP(S) URL directly into an S3 object.

This crate performs one download-then-upload transfer per invocation,
without buffering the full payload in memory or on disk.  The download and
upload legs are connected through a single bounded byte channel: the store
write pulls chunks as the network response delivers them, and a relay stage
counts every byte exactly once on the way through.  The final count, not any
header-declared length, is the authoritative transfer size.

The pieces, in pipeline order:

* [kv] -- parse free-form header/metadata/tag inputs; malformed optional
  input degrades to "absent", never to a failure.
* [download] -- issue the outbound request with bounded retries and hand
  back the live body stream.
* [relay] -- the byte-counting pass-through between the two legs.
* [store] -- existence checks and streaming writes against S3, behind the
  [store::ObjectStore] seam.
* [transfer] -- the orchestrator sequencing existence check, download, and
  upload into one [TransferResult].

 */
pub mod cli;
pub mod download;
pub mod error;
pub mod kv;
pub mod relay;
pub mod request;
pub mod retry;
pub mod store;
pub mod summary;
pub mod transfer;

#[cfg(test)]
mod test_helpers;

pub use error::TransferError;
pub use request::{TransferRequest, TransferResult};
