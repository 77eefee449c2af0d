//! Monitored website registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CertwatchError, Result};

/// A site whose TLS certificate is monitored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: Uuid,
    pub name: String,
    /// Hostname or `https://` URL. Port 443 is assumed unless given.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Website {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Hostname with any scheme, path, and port stripped.
    pub fn hostname(&self) -> &str {
        let raw = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))
            .unwrap_or(&self.url);
        let raw = raw.split('/').next().unwrap_or(raw);
        raw.split(':').next().unwrap_or(raw)
    }

    /// Explicit port in the URL, defaulting to 443.
    pub fn port(&self) -> u16 {
        let raw = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))
            .unwrap_or(&self.url);
        let raw = raw.split('/').next().unwrap_or(raw);
        raw.split_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(443)
    }
}

/// Storage abstraction for the website registry.
#[async_trait]
pub trait WebsiteStore: Send + Sync {
    async fn list(&self) -> Vec<Website>;
    async fn list_active(&self) -> Vec<Website>;
    async fn get(&self, id: Uuid) -> Result<Website>;
    async fn insert(&self, site: Website) -> Result<Website>;
    async fn update(&self, site: Website) -> Result<Website>;
    async fn remove(&self, id: Uuid) -> Result<()>;
}

/// In-memory store used by the server and in tests.
#[derive(Default)]
pub struct MemoryWebsiteStore {
    sites: RwLock<HashMap<Uuid, Website>>,
}

impl MemoryWebsiteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl WebsiteStore for MemoryWebsiteStore {
    async fn list(&self) -> Vec<Website> {
        let mut sites: Vec<_> = self.sites.read().await.values().cloned().collect();
        sites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sites
    }

    async fn list_active(&self) -> Vec<Website> {
        self.list().await.into_iter().filter(|s| s.is_active).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Website> {
        self.sites
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CertwatchError::WebsiteNotFound(id.to_string()))
    }

    async fn insert(&self, site: Website) -> Result<Website> {
        self.sites.write().await.insert(site.id, site.clone());
        Ok(site)
    }

    async fn update(&self, mut site: Website) -> Result<Website> {
        let mut sites = self.sites.write().await;
        if !sites.contains_key(&site.id) {
            return Err(CertwatchError::WebsiteNotFound(site.id.to_string()));
        }
        site.updated_at = Utc::now();
        sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.sites
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CertwatchError::WebsiteNotFound(id.to_string()))
    }
}
