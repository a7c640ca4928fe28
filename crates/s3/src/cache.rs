//! Connected client cache
//!
//! Building an SDK client resolves credentials and configuration, so clients
//! are reused across transfers that share the same profile, region and
//! endpoint. The cache is an ordinary value owned by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use sc_core::{ConnectionOptions, Result};

use crate::client::S3Client;

/// Clients keyed by [`ConnectionOptions::cache_key`]
#[derive(Debug, Default)]
pub struct ClientCache {
    clients: RwLock<HashMap<String, Arc<S3Client>>>,
}

impl ClientCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for `options`, connecting on first use
    pub async fn get_or_connect(&self, options: &ConnectionOptions) -> Result<Arc<S3Client>> {
        let key = options.cache_key();
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(Arc::clone(client));
        }

        let mut clients = self.clients.write().await;
        // Another task may have connected while we waited for the write lock
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        debug!(key = %key, "connecting new S3 client");
        let client = Arc::new(S3Client::connect(options).await?);
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    /// Drop every cached client
    pub async fn clear(&self) {
        self.clients.write().await.clear();
    }

    /// Number of cached clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the cache holds no clients
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
