//! Middleware chain run before adapter lifecycle actions
//!
//! Middlewares are validators/transformers attached to a single adapter. The
//! chain runs them one after another, in attachment order, and the adapter only
//! performs its action once every middleware has returned successfully.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};

/// Lifecycle action a middleware is invoked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Write,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Action::Create => write!(f, "create"),
            Action::Read => write!(f, "read"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
            Action::Write => write!(f, "write"),
        }
    }
}

/// A side-effecting step run on a data object before an adapter action
#[async_trait]
pub trait Middleware<T>: Send + Sync
where
    T: Send,
{
    /// Identity used to reject duplicate attachment
    fn id(&self) -> &str;

    /// Inspect or mutate `data` ahead of `action`. Returning an error aborts
    /// the chain and the adapter action.
    async fn execute(&self, data: &mut T, action: Action) -> anyhow::Result<()>;
}

/// Ordered list of middlewares owned by one adapter
pub struct MiddlewareChain<T: Send> {
    middlewares: RwLock<Vec<Arc<dyn Middleware<T>>>>,
}

impl<T: Send> MiddlewareChain<T> {
    pub fn new() -> Self {
        Self {
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// Attach a middleware at the end of the chain.
    ///
    /// Fails with `Conflict` when a middleware with the same id is already
    /// attached; the existing one is kept.
    pub fn attach(&self, middleware: Arc<dyn Middleware<T>>) -> CoreResult<()> {
        let mut middlewares = self.middlewares.write().unwrap_or_else(|e| e.into_inner());

        if middlewares.iter().any(|m| m.id() == middleware.id()) {
            return Err(CoreError::Conflict(middleware.id().to_string()));
        }

        tracing::debug!(middleware = %middleware.id(), position = middlewares.len(), "Middleware attached");
        middlewares.push(middleware);
        Ok(())
    }

    /// Ids of attached middlewares, in run order
    pub fn ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|m| m.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every middleware over `data` for `action`, sequentially.
    ///
    /// The first failure stops the chain and is returned; later middlewares
    /// are not invoked.
    pub async fn run(&self, mut data: T, action: Action) -> CoreResult<T> {
        // Clone the list so the lock is not held across await points.
        let middlewares = self.snapshot();

        for middleware in &middlewares {
            if let Err(source) = middleware.execute(&mut data, action).await {
                tracing::warn!(
                    middleware = %middleware.id(),
                    action = %action,
                    error = %source,
                    "Middleware aborted chain"
                );
                return Err(CoreError::MiddlewareRejected {
                    id: middleware.id().to_string(),
                    action,
                    source,
                });
            }
        }

        Ok(data)
    }

    fn snapshot(&self) -> Vec<Arc<dyn Middleware<T>>> {
        self.middlewares
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<T: Send> Default for MiddlewareChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> std::fmt::Debug for MiddlewareChain<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &self.ids())
            .finish()
    }
}
