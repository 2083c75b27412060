//! Capability traits for the non-storage service categories
//!
//! Concrete implementations live with the vendor integrations; the core only
//! fixes the boundary so they can be held in a [`ProviderRegistry`]. Vendor
//! failures surface as `anyhow::Error` with the SDK message preserved as
//! context.
//!
//! [`ProviderRegistry`]: crate::registry::ProviderRegistry

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Authenticated principal returned by an [`AuthProvider`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    #[serde(default)]
    pub claims: serde_json::Value,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Verify a credential (token, API key) and return the identity it grants
    async fn authenticate(&self, credential: &str) -> anyhow::Result<Identity>;
}

/// Record store: databases and hosted backends
#[async_trait]
pub trait BackendProvider: Send + Sync {
    async fn find(&self, collection: &str, id: &str) -> anyhow::Result<Option<serde_json::Value>>;

    /// Insert or replace a record, returning the stored form
    async fn save(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value>;

    /// Remove a record. `false` when it did not exist.
    async fn remove(&self, collection: &str, id: &str) -> anyhow::Result<bool>;
}

/// Message received from a queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub id: String,
    pub payload: Bytes,
    /// Opaque handle used to acknowledge the message
    pub receipt: String,
}

#[async_trait]
pub trait QueueProvider: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> anyhow::Result<String>;

    async fn receive(&self, topic: &str, max_messages: usize) -> anyhow::Result<Vec<QueueMessage>>;

    async fn acknowledge(&self, topic: &str, receipt: &str) -> anyhow::Result<()>;
}

/// Push, email or SMS notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Deliver a notification, returning the vendor message id
    async fn send(&self, notification: &Notification) -> anyhow::Result<String>;
}
