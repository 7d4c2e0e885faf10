use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

/// A blob fetched from the object store. Objects are immutable once created;
/// their lifecycle is controlled entirely outside this service.
pub struct StoredObject {
    pub key: String,
    pub size_bytes: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// External system of record for named byte blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError>;
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
    async fn object_exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match res {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(ObjectStoreError::NotFound(key.to_string()));
                }
                if service_error.code() == Some("AccessDenied") {
                    return Err(ObjectStoreError::AccessDenied(key.to_string()));
                }
                return Err(anyhow!(service_error).into());
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(anyhow::Error::from)?
            .to_vec();

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: bytes.len() as u64,
            bytes,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Other(e.into()))?;
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(service_error).into())
                }
            }
        }
    }
}

/// In-process store used by tests in place of S3. Puts can be made to fail
/// to exercise the best-effort archive path.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .expect("object map lock poisoned")
            .insert(key.to_string(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .expect("object map lock poisoned")
            .contains_key(key)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let objects = self.objects.lock().expect("object map lock poisoned");
        match objects.get(key) {
            Some(bytes) => Ok(StoredObject {
                key: key.to_string(),
                size_bytes: bytes.len() as u64,
                bytes: bytes.clone(),
            }),
            None => Err(ObjectStoreError::NotFound(key.to_string())),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Other(anyhow!("put rejected by test store")));
        }
        self.insert(key, data);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.contains(key))
    }
}
