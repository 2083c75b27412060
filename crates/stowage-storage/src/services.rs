//! One provider registry per service category

use stowage_core::{
    AuthProvider, BackendProvider, MessagingProvider, ProviderRegistry, QueueProvider,
    ServiceCategory,
};

use crate::traits::StorageAdapter;

/// Registries for every service category, built once at startup and passed
/// to whoever resolves providers.
pub struct ServiceRegistries {
    pub auth: ProviderRegistry<dyn AuthProvider>,
    pub backend: ProviderRegistry<dyn BackendProvider>,
    pub queue: ProviderRegistry<dyn QueueProvider>,
    pub storage: ProviderRegistry<dyn StorageAdapter>,
    pub messaging: ProviderRegistry<dyn MessagingProvider>,
}

impl ServiceRegistries {
    pub fn new() -> Self {
        Self {
            auth: ProviderRegistry::new(ServiceCategory::Auth),
            backend: ProviderRegistry::new(ServiceCategory::Backend),
            queue: ProviderRegistry::new(ServiceCategory::Queue),
            storage: ProviderRegistry::new(ServiceCategory::Storage),
            messaging: ProviderRegistry::new(ServiceCategory::Messaging),
        }
    }
}

impl Default for ServiceRegistries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::Arc;
    use stowage_core::{CoreError, Identity};

    struct StaticToken;

    #[async_trait]
    impl AuthProvider for StaticToken {
        async fn authenticate(&self, token: &str) -> anyhow::Result<Identity> {
            anyhow::ensure!(token == "secret", "bad token");
            Ok(Identity {
                subject: "svc".to_string(),
                claims: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let registries = ServiceRegistries::new();
        registries
            .storage
            .register("memory", Arc::new(MemoryStorage::new()), false);
        registries.auth.register("static", Arc::new(StaticToken), false);

        assert_eq!(registries.storage.resolve(None).unwrap().name(), "memory");
        let identity = registries
            .auth
            .resolve(Some("static"))
            .unwrap()
            .authenticate("secret")
            .await
            .unwrap();
        assert_eq!(identity.subject, "svc");

        assert!(matches!(
            registries.queue.resolve(None),
            Err(CoreError::NoDefault(ServiceCategory::Queue))
        ));
        assert!(matches!(
            registries.auth.resolve(Some("memory")),
            Err(CoreError::NotFound { category: ServiceCategory::Auth, .. })
        ));
    }

    #[test]
    fn test_default_switches_on_request() {
        let registries = ServiceRegistries::default();
        registries
            .storage
            .register("primary", Arc::new(MemoryStorage::new()), false);
        registries
            .storage
            .register("archive", Arc::new(MemoryStorage::new()), true);

        assert_eq!(registries.storage.default_alias().as_deref(), Some("archive"));
        assert_eq!(
            registries.storage.aliases(),
            vec!["archive".to_string(), "primary".to_string()]
        );
    }
}
