//! Shared fakes for download and transfer tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use httptest::{matchers::*, responders::*, Expectation};

use crate::download::BodyStream;
use crate::error::{Result, TransferError};
use crate::request::{Auth, Destination, TransferRequest, UploadOptions};
use crate::retry::Retry;
use crate::store::{ByteSource, ObjectStore, StoredObject};

const PLAINTEXT_BODY: &[u8] = b"hello, world";

// gzip encoding of "hello, world"
const GZIPPED_BODY: &[u8] = &[
    31u8, 139, 8, 0, 0, 0, 0, 0, 0, 255, 203, 72, 205, 201, 201, 215, 81, 40, 207, 47, 202, 73, 1,
    0, 58, 114, 171, 255, 12, 0, 0, 0,
];

/// Event logger, used to log events from various places and then assert on
/// them.
#[derive(Default, Clone)]
pub(crate) struct Logger {
    logged: Arc<Mutex<Vec<String>>>,
}

impl Logger {
    pub(crate) fn log<S: Into<String>>(&self, message: S) {
        self.logged.lock().unwrap().push(message.into())
    }

    pub(crate) fn assert(&self, expected: Vec<String>) {
        assert_eq!(*self.logged.lock().unwrap(), expected);
    }
}

/// A fake origin serving b"hello, world" at `/data` with the given status
/// sequence.  The server expects exactly one request per listed status, so
/// attempt counts are verified on drop; an empty sequence means the origin
/// must never be contacted at all.
pub(crate) struct FakeDataServer {
    server: httptest::Server,
}

impl FakeDataServer {
    pub(crate) fn new(gzip_encoded: bool, responses: &[u16]) -> Self {
        let server = httptest::Server::run();
        if responses.is_empty() {
            server.expect(
                Expectation::matching(request::method_path("GET", "/data"))
                    .times(0)
                    .respond_with(status_code(500)),
            );
        } else {
            server.expect(
                Expectation::matching(request::method_path("GET", "/data"))
                    .times(responses.len())
                    .respond_with(cycle(
                        responses
                            .iter()
                            .map(|response| {
                                let responder: Box<dyn Responder> = Box::new(if *response == 200 {
                                    if gzip_encoded {
                                        status_code(200)
                                            .append_header("Content-Type", "text/plain")
                                            .append_header("Content-Encoding", "gzip")
                                            .body(GZIPPED_BODY)
                                    } else {
                                        status_code(200)
                                            .append_header("Content-Type", "text/plain")
                                            .body(PLAINTEXT_BODY)
                                    }
                                } else {
                                    status_code(*response).body(&b""[..])
                                });
                                responder
                            })
                            .collect(),
                    )),
            );
        }
        Self { server }
    }

    pub(crate) fn data_url(&self) -> String {
        self.server.url_str("/data")
    }
}

/// A request aimed at `url` with retries disabled and an inert destination.
pub(crate) fn request_for(url: &str) -> TransferRequest {
    TransferRequest {
        url: url.to_string(),
        method: "GET".into(),
        headers: None,
        body: None,
        timeout: Duration::from_secs(30),
        retry: Retry::disabled(),
        auth: Auth::default(),
        destination: Destination {
            bucket: "test-bucket".into(),
            key: "some/key".into(),
            expected_owner: None,
        },
        content_type: None,
        if_not_exists: false,
        upload: UploadOptions::default(),
    }
}

/// Drain a download body stream into a buffer.
pub(crate) async fn collect_body(mut body: BodyStream) -> std::io::Result<Vec<u8>> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected)
}

/// Fake implementation of the object store that records calls and captures
/// the streamed bytes.
#[derive(Default)]
pub(crate) struct FakeObjectStore {
    pub(crate) logger: Logger,
    pub(crate) exists: bool,
    pub(crate) exists_error: bool,
    pub(crate) put_error: bool,
    pub(crate) received: Mutex<Vec<u8>>,
}

impl FakeObjectStore {
    pub(crate) fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn exists(&self, dest: &Destination) -> Result<bool> {
        if self.exists_error {
            return Err(TransferError::storage(dest.url(), "access denied"));
        }
        self.logger.log(format!("exists {}", dest.url()));
        Ok(self.exists)
    }

    async fn put(
        &self,
        dest: &Destination,
        mut body: ByteSource,
        length_hint: u64,
        content_type: &str,
        _opts: &UploadOptions,
    ) -> Result<StoredObject> {
        if self.put_error {
            return Err(TransferError::storage(dest.url(), "write refused"));
        }
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                TransferError::storage(dest.url(), format!("source stream failed: {err}"))
            })?;
            self.received.lock().unwrap().extend_from_slice(&chunk);
        }
        self.logger.log(format!(
            "put {} hint={} type={}",
            dest.url(),
            length_hint,
            content_type
        ));
        Ok(StoredObject {
            e_tag: "fake-etag".into(),
            url: dest.url(),
        })
    }
}
