//! Middleware-guarded storage adapter
//!
//! [`MiddlewareStorage`] wraps any adapter and runs its middleware chain over
//! the descriptor before each operation. Middlewares may rewrite the
//! descriptor (for instance to namespace keys); a rejection aborts the
//! operation and the inner adapter is never called.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stowage_core::{Action, FileDescriptor, Middleware, MiddlewareChain};

use crate::traits::{
    ByteReader, ByteStream, Capabilities, DownloadTarget, Downloaded, MoveOutcome,
    StorageAdapter, StorageResult, UrlAction,
};

pub struct MiddlewareStorage {
    inner: Arc<dyn StorageAdapter>,
    chain: MiddlewareChain<FileDescriptor>,
}

impl MiddlewareStorage {
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            chain: MiddlewareChain::new(),
        }
    }

    /// Attach a middleware; duplicate ids are rejected with `Conflict`
    pub fn attach(&self, middleware: Arc<dyn Middleware<FileDescriptor>>) -> StorageResult<()> {
        self.chain.attach(middleware)?;
        Ok(())
    }

    pub fn chain(&self) -> &MiddlewareChain<FileDescriptor> {
        &self.chain
    }

    pub fn inner(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner
    }

    async fn guard(&self, descriptor: &FileDescriptor, action: Action) -> StorageResult<FileDescriptor> {
        Ok(self.chain.run(descriptor.clone(), action).await?)
    }
}

#[async_trait]
impl StorageAdapter for MiddlewareStorage {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn create(
        &self,
        descriptor: &FileDescriptor,
        source: ByteReader,
    ) -> StorageResult<FileDescriptor> {
        let descriptor = self.guard(descriptor, Action::Create).await?;
        self.inner.create(&descriptor, source).await
    }

    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream> {
        let descriptor = self.guard(descriptor, Action::Read).await?;
        self.inner.get_readable(&descriptor).await
    }

    async fn download(
        &self,
        descriptor: &FileDescriptor,
        target: DownloadTarget,
    ) -> StorageResult<Downloaded> {
        let descriptor = self.guard(descriptor, Action::Read).await?;
        self.inner.download(&descriptor, target).await
    }

    async fn copy(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<FileDescriptor> {
        let source = self.guard(source, Action::Read).await?;
        let destination = self.guard(destination, Action::Write).await?;
        self.inner.copy(&source, &destination).await
    }

    async fn move_object(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<MoveOutcome> {
        let source = self.guard(source, Action::Delete).await?;
        let destination = self.guard(destination, Action::Write).await?;
        self.inner.move_object(&source, &destination).await
    }

    async fn signed_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
        action: UrlAction,
    ) -> StorageResult<String> {
        let guarded_action = match action {
            UrlAction::Read => Action::Read,
            UrlAction::Write => Action::Write,
        };
        let descriptor = self.guard(descriptor, guarded_action).await?;
        self.inner.signed_url(&descriptor, expires_in, action).await
    }

    async fn upload_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let descriptor = self.guard(descriptor, Action::Write).await?;
        self.inner.upload_url(&descriptor, expires_in).await
    }

    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool> {
        let descriptor = self.guard(descriptor, Action::Delete).await?;
        self.inner.delete(&descriptor).await
    }

    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor> {
        let descriptor = self.guard(descriptor, Action::Read).await?;
        self.inner.metadata(&descriptor).await
    }
}
