//! Remote object store client.
//!
//! Audio for transcription is uploaded with a public-read ACL because
//! the transcription service fetches the object directly over plain
//! unauthenticated HTTP. Keys are derived from the task id, so
//! re-submission overwrites the previous object instead of orphaning
//! it.
//!
//! The handle owns a lazily-resolved, resettable client: credentials
//! come from the environment first, then the stored config document,
//! and the resolution result (including "not configured") is cached
//! until `reset()`. Construction is single-flight — concurrent first
//! calls share one resolution.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::content_type_for;
use crate::config::ConfigStore;
use crate::error::{PipelineError, PipelineResult};

type HmacSha1 = Hmac<Sha1>;

/// Seam the pipeline uses; implemented by [`ObjectStoreHandle`] and by
/// test doubles.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload a local file under `key` with public-read visibility.
    /// Returns the public URL.
    async fn put(&self, local_path: &Path, key: &str) -> PipelineResult<String>;

    /// Best-effort delete. Failures are logged, never propagated.
    async fn delete(&self, key: &str);
}

/// Fully-resolved, non-empty credentials for one bucket.
#[derive(Debug, Clone)]
pub struct OssCredentials {
    pub region: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
}

pub struct OssClient {
    http: reqwest::Client,
    creds: OssCredentials,
}

impl OssClient {
    pub fn new(creds: OssCredentials) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { http, creds }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}.aliyuncs.com/{}",
            self.creds.bucket, self.creds.region, key
        )
    }

    pub async fn put(&self, local_path: &Path, key: &str) -> PipelineResult<String> {
        let body = tokio::fs::read(local_path).await.map_err(|e| {
            PipelineError::Upload(format!(
                "cannot read local file {:?}: {}",
                local_path, e
            ))
        })?;

        let ext = local_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let content_type = content_type_for(ext);
        let date = http_date();
        let string_to_sign = format!(
            "PUT\n\n{}\n{}\nx-oss-object-acl:public-read\n/{}/{}",
            content_type, date, self.creds.bucket, key
        );
        let authorization = self.authorization(&string_to_sign);

        let url = self.public_url(key);
        debug!("Uploading {:?} to {}", local_path, url);

        let response = self
            .http
            .put(&url)
            .header("Date", &date)
            .header("Content-Type", content_type)
            .header("x-oss-object-acl", "public-read")
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Upload(format!("object store PUT failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload(format!(
                "object store PUT returned {}: {}",
                status, body
            )));
        }

        info!("Uploaded audio object {}", key);
        Ok(url)
    }

    pub async fn delete(&self, key: &str) {
        let date = http_date();
        let string_to_sign = format!(
            "DELETE\n\n\n{}\n/{}/{}",
            date, self.creds.bucket, key
        );
        let authorization = self.authorization(&string_to_sign);

        let result = self
            .http
            .delete(self.public_url(key))
            .header("Date", &date)
            .header("Authorization", authorization)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Deleted audio object {}", key);
            }
            Ok(response) => {
                warn!(
                    "Object store DELETE for {} returned {}",
                    key,
                    response.status()
                );
            }
            Err(e) => warn!("Object store DELETE for {} failed: {}", key, e),
        }
    }

    fn authorization(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.creds.access_key_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("OSS {}:{}", self.creds.access_key_id, signature)
    }
}

fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Cached resolution outcome. `None` means "resolved, unavailable".
type Resolution = Option<Arc<OssClient>>;

pub struct ObjectStoreHandle {
    config: ConfigStore,
    cache: Mutex<Option<Resolution>>,
}

impl ObjectStoreHandle {
    pub fn new(config: ConfigStore) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    /// Resolve (or return the cached) client. Never errors: an absent
    /// or incomplete configuration yields `None`, and that outcome is
    /// cached like a success. Holding the cache lock across the
    /// resolution makes concurrent first calls single-flight.
    pub async fn acquire(&self) -> Option<Arc<OssClient>> {
        let mut cache = self.cache.lock().await;
        if let Some(resolution) = cache.as_ref() {
            return resolution.clone();
        }

        let resolution = self.resolve();
        *cache = Some(resolution.clone());
        resolution
    }

    /// Invalidate the cached resolution so the next `acquire()`
    /// re-reads credentials. Called after the user edits stored
    /// credentials without restarting the process.
    pub async fn reset(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
        info!("Object store handle reset; credentials will be re-resolved");
    }

    pub async fn is_available(&self) -> bool {
        self.acquire().await.is_some()
    }

    fn resolve(&self) -> Resolution {
        let stored = match self.config.load() {
            Ok(config) => config.object_store,
            Err(e) => {
                warn!("Failed to load stored object store config: {}", e);
                Default::default()
            }
        };
        let resolved = stored.resolved();

        match (
            resolved.region,
            resolved.access_key_id,
            resolved.access_key_secret,
            resolved.bucket,
        ) {
            (Some(region), Some(access_key_id), Some(access_key_secret), Some(bucket)) => {
                info!(
                    "Object store configured: bucket {} in {}",
                    bucket, region
                );
                Some(Arc::new(OssClient::new(OssCredentials {
                    region,
                    access_key_id,
                    access_key_secret,
                    bucket,
                })))
            }
            _ => {
                warn!("Object store is not configured; uploads will be rejected");
                None
            }
        }
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreHandle {
    async fn put(&self, local_path: &Path, key: &str) -> PipelineResult<String> {
        let client = self.acquire().await.ok_or_else(|| {
            PipelineError::Config("object storage credentials are not configured".to_string())
        })?;
        client.put(local_path, key).await
    }

    async fn delete(&self, key: &str) {
        if let Some(client) = self.acquire().await {
            client.delete(key).await;
        }
    }
}
