//! Input and output bundles for a single transfer.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Result, TransferError};
use crate::retry::Retry;

/// Destination coordinates in the object store.
#[derive(Debug, Clone)]
pub struct Destination {
    pub bucket: String,
    pub key: String,
    /// Expected bucket-owner account, asserted on every store call.
    pub expected_owner: Option<String>,
}

impl Destination {
    pub fn url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthKind {
    #[default]
    None,
    Basic,
    Bearer,
}

/// Authentication descriptor for the outbound request.  Credentials are
/// validated lazily, when the `Authorization` header is rendered, so that a
/// misconfiguration surfaces before any network call rather than at parse
/// time.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    pub kind: AuthKind,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Auth {
    /// Render the `Authorization` header value for the selected scheme, or
    /// `None` when no authentication was requested.
    pub fn header_value(&self) -> Result<Option<String>> {
        match self.kind {
            AuthKind::None => Ok(None),
            AuthKind::Basic => match (&self.username, &self.password) {
                (Some(username), Some(password)) => Ok(Some(format!(
                    "Basic {}",
                    BASE64.encode(format!("{username}:{password}"))
                ))),
                _ => Err(TransferError::config(
                    "basic auth requires both a username and a password",
                )),
            },
            AuthKind::Bearer => match &self.token {
                Some(token) => Ok(Some(format!("Bearer {token}"))),
                None => Err(TransferError::config("bearer auth requires a token")),
            },
        }
    }
}

/// Object-store write options that pass through to the destination verbatim.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeMap<String, String>>,
}

/// Immutable input bundle for one transfer, constructed once per invocation.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub method: String,
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body, attached only for POST/PUT/PATCH.
    pub body: Option<String>,
    pub timeout: Duration,
    pub retry: Retry,
    pub auth: Auth,
    pub destination: Destination,
    /// Overrides the content type negotiated with the origin.
    pub content_type: Option<String>,
    /// Skip the whole transfer when the destination object already exists.
    pub if_not_exists: bool,
    pub upload: UploadOptions,
}

/// The sole artifact handed back to the caller, emitted only after both
/// download and upload have definitively succeeded (or the skip path was
/// taken).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// HTTP status of the download; 0 on the skip path, where no HTTP
    /// exchange happens at all.
    pub status_code: u16,
    /// Bytes actually relayed, as observed by the byte counter.  More
    /// trustworthy than any header-declared length.
    pub bytes_transferred: u64,
    /// Destination in `s3://bucket/key` form.
    pub url: String,
    /// Store-assigned integrity tag; empty only when the transfer was
    /// skipped.
    pub e_tag: String,
    pub existed_already: bool,
}

impl TransferResult {
    /// The zero-byte, empty-tag result for an object that already existed.
    pub fn skipped(destination: &Destination) -> Self {
        Self {
            status_code: 0,
            bytes_transferred: 0,
            url: destination.url(),
            e_tag: String::new(),
            existed_already: true,
        }
    }
}
