//! Provider registry shared by every service category
//!
//! Each category (auth, backend, queue, storage, messaging) owns one
//! `ProviderRegistry` that maps aliases to provider instances and remembers a
//! default alias. Registries are plain values handed to whoever needs them;
//! nothing here is process-global.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, RwLock};

use crate::error::{CoreError, CoreResult};

/// Service categories that get their own registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    Auth,
    Backend,
    Queue,
    Storage,
    Messaging,
}

impl Display for ServiceCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ServiceCategory::Auth => write!(f, "auth"),
            ServiceCategory::Backend => write!(f, "backend"),
            ServiceCategory::Queue => write!(f, "queue"),
            ServiceCategory::Storage => write!(f, "storage"),
            ServiceCategory::Messaging => write!(f, "messaging"),
        }
    }
}

struct Entries<P: ?Sized> {
    providers: HashMap<String, Arc<P>>,
    default_alias: Option<String>,
}

/// Alias → provider map for one service category.
///
/// `P` is usually a trait object such as `dyn StorageAdapter`. Registration is
/// expected at startup; lookups afterwards only take the read lock.
pub struct ProviderRegistry<P: ?Sized> {
    category: ServiceCategory,
    entries: RwLock<Entries<P>>,
}

impl<P: ?Sized> ProviderRegistry<P> {
    /// Create an empty registry for a category
    pub fn new(category: ServiceCategory) -> Self {
        Self {
            category,
            entries: RwLock::new(Entries {
                providers: HashMap::new(),
                default_alias: None,
            }),
        }
    }

    pub fn category(&self) -> ServiceCategory {
        self.category
    }

    /// Register a provider under `alias`.
    ///
    /// An existing provider with the same alias is replaced. When
    /// `make_default` is set, or no default exists yet, the alias becomes the
    /// category default.
    pub fn register(&self, alias: impl Into<String>, provider: Arc<P>, make_default: bool) {
        let alias = alias.into();
        let mut entries = self.write();

        let replaced = entries.providers.insert(alias.clone(), provider).is_some();
        if make_default || entries.default_alias.is_none() {
            entries.default_alias = Some(alias.clone());
        }

        tracing::debug!(
            category = %self.category,
            alias = %alias,
            replaced = replaced,
            is_default = entries.default_alias.as_deref() == Some(alias.as_str()),
            "Provider registered"
        );
    }

    /// Resolve a provider by alias, or the default provider when `alias` is `None`
    pub fn resolve(&self, alias: Option<&str>) -> CoreResult<Arc<P>> {
        let entries = self.read();

        let alias = match alias {
            Some(alias) => alias,
            None => entries
                .default_alias
                .as_deref()
                .ok_or(CoreError::NoDefault(self.category))?,
        };

        entries
            .providers
            .get(alias)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                category: self.category,
                alias: alias.to_string(),
            })
    }

    /// Resolve the default provider
    pub fn resolve_default(&self) -> CoreResult<Arc<P>> {
        self.resolve(None)
    }

    pub fn default_alias(&self) -> Option<String> {
        self.read().default_alias.clone()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.read().providers.contains_key(alias)
    }

    /// Registered aliases, sorted
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.read().providers.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn len(&self) -> usize {
        self.read().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned lock only means a writer panicked mid-insert; the map itself
    // is still a valid HashMap, so keep serving it.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries<P>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Entries<P>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<P: ?Sized> std::fmt::Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProviderRegistry")
            .field("category", &self.category)
            .field("aliases", &self.aliases())
            .field("default_alias", &self.default_alias())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Named(&'static str);

    impl Greeter for Named {
        fn greet(&self) -> String {
            self.0.to_string()
        }
    }

    fn registry() -> ProviderRegistry<dyn Greeter> {
        ProviderRegistry::new(ServiceCategory::Messaging)
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = registry();
        assert!(registry.is_empty());
        assert_eq!(registry.default_alias(), None);
    }

    #[test]
    fn test_resolve_unknown_alias_is_not_found() {
        let registry = registry();
        registry.register("fcm", Arc::new(Named("fcm")), false);

        for alias in ["apns", "", "FCM"] {
            let err = registry.resolve(Some(alias)).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::NotFound);
            assert!(err.to_string().contains("messaging"));
            assert!(err.to_string().contains(&format!("'{}'", alias)));
        }
    }

    #[test]
    fn test_resolve_default_without_registrations() {
        let registry = registry();
        let err = registry.resolve(None).err().unwrap();
        assert!(matches!(err, CoreError::NoDefault(ServiceCategory::Messaging)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_first_registration_becomes_default() {
        let registry = registry();
        registry.register("fcm", Arc::new(Named("fcm")), false);
        registry.register("apns", Arc::new(Named("apns")), false);

        assert_eq!(registry.default_alias().as_deref(), Some("fcm"));
        assert_eq!(registry.resolve_default().unwrap().greet(), "fcm");
    }

    #[test]
    fn test_make_default_moves_pointer() {
        let registry = registry();
        registry.register("fcm", Arc::new(Named("fcm")), true);
        registry.register("apns", Arc::new(Named("apns")), true);

        assert_eq!(registry.resolve(None).unwrap().greet(), "apns");
        assert_eq!(registry.resolve(Some("fcm")).unwrap().greet(), "fcm");
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = registry();
        registry.register("push", Arc::new(Named("first")), false);
        registry.register("push", Arc::new(Named("second")), false);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.aliases(), vec!["push".to_string()]);
        assert_eq!(registry.resolve(Some("push")).unwrap().greet(), "second");
    }

    #[test]
    fn test_shared_across_threads() {
        let registry = Arc::new(registry());
        registry.register("fcm", Arc::new(Named("fcm")), true);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve_default().unwrap().greet())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "fcm");
        }
    }
}
