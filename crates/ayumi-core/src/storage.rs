//! Persistent key-value storage
//!
//! The runtime only needs a small contract from its store: JSON values under
//! string keys, plus a ranked query over a collection. Two backends are
//! provided: JSON files in a local directory, and Cloudflare R2 / AWS S3.

use crate::config::CoreSettings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use moka::future::Cache;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting object into S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, invalid keys, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Interface for storage providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError>;
    /// Rows of `collection` ordered by the numeric field `order_by`,
    /// highest first, at most `limit` of them.
    async fn query(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// Rank the rows of a collection value.
///
/// A collection is stored either as a JSON array of rows or as an object
/// whose values are rows. Rows lacking a numeric `order_by` field sort last.
#[must_use]
pub fn rank_rows(collection: Option<Value>, order_by: &str, limit: usize) -> Vec<Value> {
    let mut rows: Vec<Value> = match collection {
        Some(Value::Array(rows)) => rows,
        Some(Value::Object(map)) => map.into_iter().map(|(_, row)| row).collect(),
        _ => Vec::new(),
    };

    let score = |row: &Value| row.get(order_by).and_then(Value::as_f64).unwrap_or(f64::MIN);
    rows.sort_by(|a, b| score(b).total_cmp(&score(a)));
    rows.truncate(limit);
    rows
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|segment| segment.is_empty() || segment == "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::Config(format!("invalid storage key: {key:?}")))
    }
}

/// Local storage: one pretty-printed JSON file per key.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash never leaves a half-written value behind.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the JSON files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.read(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let body = serde_json::to_vec_pretty(&value)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError> {
        Ok(rank_rows(self.read(collection).await?, order_by, limit))
    }

    async fn check_connection(&self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| format!("data directory {} unusable: {e}", self.root.display()))?;
        info!("Using local storage at {}.", self.root.display());
        Ok(())
    }
}

/// R2-backed storage implementation
pub struct R2Store {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl R2Store {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &CoreSettings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(60 * 60)) // 1 hour
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
        })
    }

    fn object_key(key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!("ayumi/{key}.json"))
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let object_key = Self::object_key(key)?;

        // Read-Through: Check cache first
        if let Some(cached) = self.cache.get(&object_key).await {
            match serde_json::from_slice(&cached) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    warn!("Cache deserialization failed for {}: {}", object_key, e);
                    self.cache.invalidate(&object_key).await;
                }
            }
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();

                let value = serde_json::from_slice(&data)?;
                self.cache
                    .insert(object_key, Arc::new(data.to_vec()))
                    .await;
                Ok(Some(value))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }
}

#[async_trait]
impl KeyValueStore for R2Store {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.load(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let object_key = Self::object_key(key)?;
        let body_bytes = serde_json::to_vec_pretty(&value)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(body_bytes.clone()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        // Write-Through once the object is durable
        self.cache.insert(object_key, Arc::new(body_bytes)).await;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError> {
        Ok(rank_rows(self.load(collection).await?, order_by, limit))
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

/// Build the store selected by the settings: R2 when fully configured,
/// otherwise JSON files under `data_dir`.
///
/// # Errors
///
/// Returns an error if the R2 client cannot be configured.
pub async fn open_store(settings: &CoreSettings) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    if settings.r2_configured() {
        let store = R2Store::new(settings).await?;
        info!("R2 Storage initialized.");
        Ok(Arc::new(store))
    } else {
        info!("R2 not configured, falling back to local JSON storage.");
        Ok(Arc::new(FileStore::new(&settings.data_dir)))
    }
}
