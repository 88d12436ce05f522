//! Command-line surface: one flag per invocation parameter, converted into
//! an immutable [TransferRequest].

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::kv;
use crate::request::{Auth, AuthKind, Destination, TransferRequest, UploadOptions};
use crate::retry::Retry;

#[derive(Parser, Debug)]
#[command(name = "url-to-s3", version)]
#[command(about = "Stream a URL directly into an S3 object, without touching local disk")]
pub struct Cli {
    /// Source URL to fetch
    #[arg(long)]
    pub url: String,

    /// Destination bucket
    #[arg(long = "s3-bucket")]
    pub s3_bucket: String,

    /// Destination object key
    #[arg(long = "s3-key")]
    pub s3_key: String,

    /// HTTP method for the request
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request headers, as a JSON object or `k=v;k2=v2`
    #[arg(long)]
    pub headers: Option<String>,

    /// Request body, sent for POST/PUT/PATCH only
    #[arg(long = "post-data")]
    pub post_data: Option<String>,

    /// Network timeout in milliseconds
    #[arg(long, default_value_t = 900_000)]
    pub timeout: u64,

    /// Retry transient network failures with exponential backoff
    #[arg(long = "enable-retry")]
    pub enable_retry: bool,

    /// Authentication scheme for the source
    #[arg(long = "auth-type", value_enum, default_value = "none")]
    pub auth_type: AuthType,

    #[arg(long = "auth-username")]
    pub auth_username: Option<String>,

    #[arg(long = "auth-password", env = "URL_TO_S3_AUTH_PASSWORD", hide_env_values = true)]
    pub auth_password: Option<String>,

    #[arg(long = "auth-token", env = "URL_TO_S3_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Expected bucket-owner account ID, asserted on every store call
    #[arg(long = "bucket-owner")]
    pub bucket_owner: Option<String>,

    /// Canned ACL to attach to the object
    #[arg(long)]
    pub acl: Option<String>,

    /// Storage class for the object
    #[arg(long = "storage-class", default_value = "STANDARD")]
    pub storage_class: String,

    /// Override the content type negotiated with the origin
    #[arg(long = "content-type")]
    pub content_type: Option<String>,

    /// Cache-Control directive to store with the object
    #[arg(long = "cache-control")]
    pub cache_control: Option<String>,

    /// Object metadata, as a JSON object or `k=v;k2=v2`
    #[arg(long)]
    pub metadata: Option<String>,

    /// Object tags, as a JSON object or `k=v;k2=v2`
    #[arg(long)]
    pub tags: Option<String>,

    /// Skip the transfer entirely when the object already exists
    #[arg(long = "if-not-exists")]
    pub if_not_exists: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
}

impl From<AuthType> for AuthKind {
    fn from(value: AuthType) -> Self {
        match value {
            AuthType::None => AuthKind::None,
            AuthType::Basic => AuthKind::Basic,
            AuthType::Bearer => AuthKind::Bearer,
        }
    }
}

impl Cli {
    /// Build the immutable request bundle.  Malformed optional key/value
    /// fields degrade to "absent" with a warning; they never fail the run.
    pub fn into_request(self) -> TransferRequest {
        TransferRequest {
            headers: kv::parse(self.headers.as_deref(), "headers"),
            url: self.url,
            method: self.method,
            body: self.post_data,
            timeout: Duration::from_millis(self.timeout),
            retry: if self.enable_retry {
                Retry::default()
            } else {
                Retry::disabled()
            },
            auth: Auth {
                kind: self.auth_type.into(),
                username: self.auth_username,
                password: self.auth_password,
                token: self.auth_token,
            },
            destination: Destination {
                bucket: self.s3_bucket,
                key: self.s3_key,
                expected_owner: self.bucket_owner,
            },
            content_type: self.content_type,
            if_not_exists: self.if_not_exists,
            upload: UploadOptions {
                acl: self.acl,
                storage_class: Some(self.storage_class),
                cache_control: self.cache_control,
                metadata: kv::parse(self.metadata.as_deref(), "metadata"),
                tags: kv::parse(self.tags.as_deref(), "tags"),
            },
        }
    }
}
