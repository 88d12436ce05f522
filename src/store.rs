//! The upload leg: existence checks and streaming writes against S3.
//!
//! The [ObjectStore] trait is the seam between the orchestrator and the real
//! store client, so tests can inject a fake implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, SdkBody};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, StorageClass};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::error::{Result, TransferError};
use crate::relay::Chunk;
use crate::request::{Destination, UploadOptions};

/// The canned access-control policies S3 accepts.
pub const CANNED_ACLS: [&str; 7] = [
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "aws-exec-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
];

/// The storage tiers S3 accepts for direct writes.
pub const STORAGE_CLASSES: [&str; 8] = [
    "STANDARD",
    "REDUCED_REDUNDANCY",
    "STANDARD_IA",
    "ONEZONE_IA",
    "INTELLIGENT_TIERING",
    "GLACIER",
    "DEEP_ARCHIVE",
    "GLACIER_IR",
];

/// Part size for length-agnostic multipart writes.  At most one part is
/// buffered at a time.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// The live byte channel the uploader consumes.
pub type ByteSource = ReceiverStream<Chunk>;

/// A successfully written object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Store-assigned integrity tag, without surrounding quotes.
    pub e_tag: String,
    /// Canonical `s3://bucket/key` destination.
    pub url: String,
}

/// The operations the orchestrator needs from the destination store.
#[async_trait]
pub trait ObjectStore {
    /// Whether an object already exists at the destination.  A not-found
    /// outcome is `Ok(false)`; anything else (permission denial, transport
    /// failure) is an error, never silently "does not exist".
    async fn exists(&self, dest: &Destination) -> Result<bool>;

    /// Stream `body` into the destination object.  `length_hint` is the
    /// header-declared length; when 0 the write proceeds without knowing the
    /// total length upfront.
    async fn put(
        &self,
        dest: &Destination,
        body: ByteSource,
        length_hint: u64,
        content_type: &str,
        opts: &UploadOptions,
    ) -> Result<StoredObject>;
}

/// The real S3-backed store.
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a store from the default credential/region provider chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    /// Fixed-length write: a single streaming `PutObject` carrying the
    /// declared length.  The body starts flowing before it is fully
    /// buffered anywhere.
    async fn put_fixed_length(
        &self,
        dest: &Destination,
        body: ByteSource,
        length: u64,
        content_type: &str,
        opts: &UploadOptions,
    ) -> Result<StoredObject> {
        let frames = body.map_ok(http_body::Frame::data);
        let sdk_body = SdkBody::from_body_1_x(http_body_util::StreamBody::new(frames));

        let mut request = self
            .client
            .put_object()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .body(ByteStream::new(sdk_body))
            .content_length(length as i64)
            .content_type(content_type)
            .set_expected_bucket_owner(dest.expected_owner.clone())
            .set_cache_control(opts.cache_control.clone())
            .set_metadata(opts.metadata.clone().map(|m| m.into_iter().collect()))
            .set_tagging(opts.tags.as_ref().map(encode_tags));
        if let Some(acl) = &opts.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(class) = &opts.storage_class {
            request = request.storage_class(StorageClass::from(class.as_str()));
        }

        let output = request.send().await.map_err(|err| {
            TransferError::storage(
                dest.url(),
                format!("upload failed: {}", DisplayErrorContext(&err)),
            )
        })?;
        Ok(StoredObject {
            e_tag: clean_e_tag(output.e_tag()),
            url: dest.url(),
        })
    }

    /// Length-agnostic write: a multipart upload fed one bounded part at a
    /// time, aborted on failure so no orphan upload lingers.
    async fn put_multipart(
        &self,
        dest: &Destination,
        body: ByteSource,
        content_type: &str,
        opts: &UploadOptions,
    ) -> Result<StoredObject> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .content_type(content_type)
            .set_expected_bucket_owner(dest.expected_owner.clone())
            .set_cache_control(opts.cache_control.clone())
            .set_metadata(opts.metadata.clone().map(|m| m.into_iter().collect()))
            .set_tagging(opts.tags.as_ref().map(encode_tags));
        if let Some(acl) = &opts.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(class) = &opts.storage_class {
            request = request.storage_class(StorageClass::from(class.as_str()));
        }

        let created = request.send().await.map_err(|err| {
            TransferError::storage(
                dest.url(),
                format!("could not start multipart upload: {}", DisplayErrorContext(&err)),
            )
        })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| TransferError::storage(dest.url(), "store returned no upload id"))?
            .to_string();
        debug!(dest = %dest.url(), upload_id, "multipart upload started");

        match self.stream_parts(dest, body, &upload_id).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                let output = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&dest.bucket)
                    .key(&dest.key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .set_expected_bucket_owner(dest.expected_owner.clone())
                    .send()
                    .await
                    .map_err(|err| {
                        TransferError::storage(
                            dest.url(),
                            format!(
                                "could not finalize multipart upload: {}",
                                DisplayErrorContext(&err)
                            ),
                        )
                    })?;
                Ok(StoredObject {
                    e_tag: clean_e_tag(output.e_tag()),
                    url: dest.url(),
                })
            }
            Err(err) => {
                // the original failure is the one worth reporting
                let _ = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&dest.bucket)
                    .key(&dest.key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                Err(err)
            }
        }
    }

    async fn stream_parts(
        &self,
        dest: &Destination,
        mut body: ByteSource,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut buffered = BytesMut::with_capacity(PART_SIZE);
        let mut part_number = 1i32;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                TransferError::storage(dest.url(), format!("source stream failed mid-upload: {err}"))
            })?;
            buffered.extend_from_slice(&chunk);
            for part in split_ready_parts(&mut buffered, PART_SIZE) {
                parts.push(self.upload_part(dest, upload_id, part_number, part).await?);
                part_number += 1;
            }
        }

        // flush the remainder; an empty body still needs its one (empty) part
        if parts.is_empty() || !buffered.is_empty() {
            let part = buffered.split().freeze();
            parts.push(self.upload_part(dest, upload_id, part_number, part).await?);
        }
        Ok(parts)
    }

    async fn upload_part(
        &self,
        dest: &Destination,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        debug!(dest = %dest.url(), part_number, len = data.len(), "uploading part");
        let output = self
            .client
            .upload_part()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .set_expected_bucket_owner(dest.expected_owner.clone())
            .send()
            .await
            .map_err(|err| {
                TransferError::storage(
                    dest.url(),
                    format!("part {part_number} failed: {}", DisplayErrorContext(&err)),
                )
            })?;
        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(output.e_tag().map(str::to_string))
            .build())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, dest: &Destination) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .set_expected_bucket_owner(dest.expected_owner.clone())
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => {
                Ok(false)
            }
            Err(err) => Err(TransferError::storage(
                dest.url(),
                format!("existence check failed: {}", DisplayErrorContext(&err)),
            )),
        }
    }

    async fn put(
        &self,
        dest: &Destination,
        body: ByteSource,
        length_hint: u64,
        content_type: &str,
        opts: &UploadOptions,
    ) -> Result<StoredObject> {
        validate_options(opts)?;
        let stored = if length_hint > 0 {
            self.put_fixed_length(dest, body, length_hint, content_type, opts)
                .await?
        } else {
            self.put_multipart(dest, body, content_type, opts).await?
        };
        info!(dest = %stored.url, e_tag = %stored.e_tag, "object written");
        Ok(stored)
    }
}

/// Reject unknown ACL or storage-class names.  The orchestrator calls this
/// before any request goes out; the store re-checks on `put`.
pub fn validate_options(opts: &UploadOptions) -> Result<()> {
    if let Some(acl) = &opts.acl {
        if !CANNED_ACLS.contains(&acl.as_str()) {
            return Err(TransferError::config(format!(
                "unknown ACL {acl:?}; expected one of {CANNED_ACLS:?}"
            )));
        }
    }
    if let Some(class) = &opts.storage_class {
        if !STORAGE_CLASSES.contains(&class.as_str()) {
            return Err(TransferError::config(format!(
                "unknown storage class {class:?}; expected one of {STORAGE_CLASSES:?}"
            )));
        }
    }
    Ok(())
}

/// Render tags as the URL-encoded `k=v&k=v` string S3 expects.
pub fn encode_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, NON_ALPHANUMERIC),
                utf8_percent_encode(value, NON_ALPHANUMERIC)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Split off every full-sized part currently buffered, leaving the remainder
/// in place for the next chunk (or the final flush).
fn split_ready_parts(buffered: &mut BytesMut, part_size: usize) -> Vec<Bytes> {
    let mut parts = Vec::new();
    while buffered.len() >= part_size {
        parts.push(buffered.split_to(part_size).freeze());
    }
    parts
}

fn clean_e_tag(e_tag: Option<&str>) -> String {
    e_tag.unwrap_or_default().trim_matches('"').to_string()
}
