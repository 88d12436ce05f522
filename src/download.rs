//! The download leg: issue the outbound HTTP request with bounded retries
//! and hand back response metadata plus the live body stream.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{header, redirect, Method};
use tracing::{debug, warn};

use crate::error::{Result, TransferError};
use crate::request::TransferRequest;
use crate::retry::Backoff;

/// Redirects are followed automatically up to this many hops.
const MAX_REDIRECTS: usize = 5;

/// Statuses worth retrying when retries are enabled; everything else in the
/// 4xx/5xx range fails on first sight.
const RETRIABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Content type assumed when the origin does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/binary";

/// The live response body, with transport errors mapped to [std::io::Error]
/// so downstream consumers see one error shape.
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Response metadata plus the live byte stream.  The stream is consumed
/// exactly once, by the upload leg.
pub struct DownloadOutcome {
    pub status: u16,
    /// Raw `Content-Length` header value; 0 when absent or non-numeric
    /// (chunked transfer, or a body the client transparently decodes).
    pub declared_length: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub body: BodyStream,
}

// The body stream is opaque, so Debug covers the metadata only.
impl std::fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOutcome")
            .field("status", &self.status)
            .field("declared_length", &self.declared_length)
            .field("content_type", &self.content_type)
            .field("content_encoding", &self.content_encoding)
            .finish_non_exhaustive()
    }
}

/// One try of the request, classified for the retry loop.
enum Attempt {
    Ok(reqwest::Response),
    Retriable(TransferError),
}

/// Issue the request described by `req`, retrying transient failures per its
/// retry policy, and return the response metadata and live body stream.
///
/// Configuration problems (bad method token, incomplete credentials, bad
/// header names) are detected and reported before any network call.
pub async fn fetch(req: &TransferRequest) -> Result<DownloadOutcome> {
    let method = Method::from_bytes(req.method.to_uppercase().as_bytes())
        .map_err(|_| TransferError::config(format!("unsupported HTTP method {:?}", req.method)))?;
    let headers = build_headers(req)?;

    let client = reqwest::Client::builder()
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(req.timeout)
        .build()
        .map_err(|err| TransferError::network(format!("could not build HTTP client: {err}"), None))?;

    let mut backoff = Backoff::new(&req.retry);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt(&client, req, method.clone(), headers.clone()).await {
            Attempt::Ok(response) => return finish(response),
            Attempt::Retriable(err) => match backoff.next_backoff() {
                Some(delay) => {
                    warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, %err,
                        "transient failure; retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
        }
    }
}

/// Merge caller-supplied headers with the synthesized `Authorization`
/// header.  The synthesized credential is inserted last, so a caller-supplied
/// `Authorization` value never wins over it.
fn build_headers(req: &TransferRequest) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(caller) = &req.headers {
        for (name, value) in caller {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|_| TransferError::config(format!("invalid header name {name:?}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|_| TransferError::config(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }
    }
    if let Some(credential) = req.auth.header_value()? {
        let value = HeaderValue::try_from(credential)
            .map_err(|_| TransferError::config("credential is not a valid header value"))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

async fn attempt(
    client: &reqwest::Client,
    req: &TransferRequest,
    method: Method,
    headers: HeaderMap,
) -> Attempt {
    let mut builder = client.request(method.clone(), &req.url).headers(headers);
    if let Some(body) = &req.body {
        if method == Method::POST || method == Method::PUT || method == Method::PATCH {
            builder = builder.body(body.clone());
        }
    }

    match builder.send().await {
        Err(err) => Attempt::Retriable(TransferError::network(
            format!("request to {} failed: {err}", req.url),
            None,
        )),
        Ok(response) => {
            let status = response.status().as_u16();
            if RETRIABLE_STATUSES.contains(&status) {
                Attempt::Retriable(TransferError::network(
                    format!("{} answered {}", req.url, response.status()),
                    Some(status),
                ))
            } else {
                Attempt::Ok(response)
            }
        }
    }
}

/// Interpret the final response: non-retried 4xx/5xx become terminal errors,
/// anything else yields a [DownloadOutcome] wrapping the body stream.
fn finish(response: reqwest::Response) -> Result<DownloadOutcome> {
    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(TransferError::HttpStatus {
            status: status.as_u16(),
            text: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }

    let declared_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let content_type = header_string(&response, header::CONTENT_TYPE);
    let content_encoding = header_string(&response, header::CONTENT_ENCODING);
    debug!(status = status.as_u16(), declared_length, ?content_type, "download started");

    let body = response
        .bytes_stream()
        .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
        .boxed();

    Ok(DownloadOutcome {
        status: status.as_u16(),
        declared_length,
        content_type,
        content_encoding,
        body,
    })
}

fn header_string(response: &reqwest::Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
