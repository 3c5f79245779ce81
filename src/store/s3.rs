//! S3 object store implementation
//!
//! Provides read access to Amazon S3 or S3-compatible storage
//! backends (MinIO, LocalStack, etc.).

use async_stream::try_stream;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tracing::{debug, trace};

use crate::config::{S3StoreConfig, StoreEnv};
use crate::error::{BucketFsError, Result};
use crate::store::{dir_prefix, join_key, ObjectStore, StoredObject, DELIMITER};

/// Endpoint used when `env: local` (LocalStack default edge port)
pub const LOCAL_ENDPOINT: &str = "http://localhost:4566";
/// Signing region used when `env: local` and no region is configured
pub const LOCAL_REGION: &str = "ap-northeast-1";

/// S3 store for Amazon S3 and S3-compatible storage
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Normalized key prefix, empty or ending with the delimiter
    root: String,
}

impl S3Store {
    /// Create a new S3 store from configuration
    pub async fn new(config: S3StoreConfig) -> Result<Self> {
        let connection = Connection::resolve(&config);

        let mut sdk_config_builder = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &connection.region {
            sdk_config_builder = sdk_config_builder.region(Region::new(region.clone()));
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &connection.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if connection.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        debug!(
            "S3 store: bucket={} env={:?} endpoint={:?} prefix={:?}",
            config.bucket, config.env, connection.endpoint, config.prefix
        );

        Ok(Self::from_client(
            client,
            config.bucket,
            config.prefix.as_deref().unwrap_or_default(),
        ))
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            root: normalize_root(prefix),
        }
    }

    /// Verify the bucket is reachable with one bounded listing
    pub async fn check(&self) -> Result<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.root)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                BucketFsError::backend(
                    format!("ListObjectsV2 on bucket '{}'", self.bucket),
                    DisplayErrorContext(&e),
                )
            })?;
        Ok(())
    }

    /// Convert a store-relative key to a bucket key
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.root, key)
    }

    /// Convert a bucket key back to a store-relative key
    fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.root.as_str()).unwrap_or(key)
    }

    /// One level of keys under `prefix`, paging through ListObjectsV2.
    ///
    /// Common prefixes come back as keys ending in the delimiter.
    fn list_stream(&self, prefix: String) -> impl Stream<Item = Result<String>> + '_ {
        try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&prefix)
                    .delimiter(DELIMITER.to_string());

                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let result = request.send().await.map_err(|e| {
                    BucketFsError::backend(
                        format!("ListObjectsV2 prefix '{}'", prefix),
                        DisplayErrorContext(&e),
                    )
                })?;

                for obj in result.contents() {
                    if let Some(key) = obj.key() {
                        yield self.relative_key(key).to_string();
                    }
                }

                for common_prefix in result.common_prefixes() {
                    if let Some(p) = common_prefix.prefix() {
                        yield self.relative_key(p).to_string();
                    }
                }

                if result.is_truncated().unwrap_or(false) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        }
    }
}

/// Client settings after applying the `env` defaults
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    region: Option<String>,
    endpoint: Option<String>,
    force_path_style: bool,
}

impl Connection {
    /// Explicit settings win; `env: local` fills the gaps with LocalStack's
    fn resolve(config: &S3StoreConfig) -> Self {
        let local = config.env == StoreEnv::Local;
        Self {
            region: config
                .region
                .clone()
                .or_else(|| local.then(|| LOCAL_REGION.to_string())),
            endpoint: config
                .endpoint
                .clone()
                .or_else(|| local.then(|| LOCAL_ENDPOINT.to_string())),
            // Virtual-host addressing resolves to bucket.localhost for local stacks
            force_path_style: config.force_path_style || local,
        }
    }
}

/// Classify a failed GetObject: a missing key is `NotFound`, anything else
/// means the store could not answer.
fn get_object_error(
    service: Option<&GetObjectError>,
    key: &str,
    operation: String,
    cause: impl ToString,
) -> BucketFsError {
    match service {
        Some(se) if se.is_no_such_key() => {
            BucketFsError::NotFound(format!("No such key: {}", key))
        }
        _ => BucketFsError::backend(operation, cause),
    }
}

/// Classify a failed HeadObject. HEAD responses have no body, so a missing
/// key only shows up as a bare 404.
fn head_object_error(
    service: Option<&HeadObjectError>,
    key: &str,
    operation: String,
    cause: impl ToString,
) -> BucketFsError {
    match service {
        Some(se) if se.is_not_found() => {
            BucketFsError::NotFound(format!("No such key: {}", key))
        }
        _ => BucketFsError::backend(operation, cause),
    }
}

/// Classify a failed ranged GetObject. A range starting at or past the end
/// of the object reads as empty.
fn range_error(
    service: Option<&GetObjectError>,
    key: &str,
    operation: String,
    cause: impl ToString,
) -> Result<Bytes> {
    match service {
        Some(se) if se.code() == Some("InvalidRange") => Ok(Bytes::new()),
        _ => Err(get_object_error(service, key, operation, cause)),
    }
}

/// Trim stray delimiters from a configured prefix and terminate it with one
fn normalize_root(prefix: &str) -> String {
    dir_prefix(prefix.trim_matches(DELIMITER))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn is_directory(&self, parent_prefix: &str, name: &str) -> Result<bool> {
        let prefix = self.full_key(&dir_prefix(&join_key(parent_prefix, name)));
        trace!("is_directory: prefix={}", prefix);

        let result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                BucketFsError::backend(
                    format!("ListObjectsV2 probe '{}'", prefix),
                    DisplayErrorContext(&e),
                )
            })?;

        Ok(result.key_count().unwrap_or(0) > 0
            || !result.contents().is_empty()
            || !result.common_prefixes().is_empty())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full = self.full_key(prefix);
        trace!("list: prefix={}", full);
        self.list_stream(full).try_collect().await
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        let full = self.full_key(key);
        trace!("get_object: key={}", full);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
            .map_err(|e| {
                get_object_error(
                    e.as_service_error(),
                    key,
                    format!("GetObject '{}'", full),
                    DisplayErrorContext(&e),
                )
            })?;

        let reported = output.content_length();
        let body = output.body.collect().await.map_err(|e| {
            BucketFsError::backend(format!("GetObject body '{}'", full), e)
        })?;
        let body = body.into_bytes();

        let content_length = reported
            .and_then(|len| u64::try_from(len).ok())
            .unwrap_or(body.len() as u64);

        Ok(StoredObject {
            body,
            content_length,
        })
    }

    async fn head_object(&self, key: &str) -> Result<u64> {
        let full = self.full_key(key);
        trace!("head_object: key={}", full);

        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
            .map_err(|e| {
                head_object_error(
                    e.as_service_error(),
                    key,
                    format!("HeadObject '{}'", full),
                    DisplayErrorContext(&e),
                )
            })?;

        Ok(output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .unwrap_or(0))
    }

    async fn get_range(&self, key: &str, offset: u64, size: u32) -> Result<Bytes> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        let full = self.full_key(key);
        trace!("get_range: key={} offset={} size={}", full, offset, size);

        let range = format!("bytes={}-{}", offset, offset + size as u64 - 1);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full)
            .range(range)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return range_error(
                    e.as_service_error(),
                    key,
                    format!("GetObject range '{}'", full),
                    DisplayErrorContext(&e),
                );
            }
        };

        let body = output.body.collect().await.map_err(|e| {
            BucketFsError::backend(format!("GetObject body '{}'", full), e)
        })?;

        Ok(body.into_bytes())
    }
}
