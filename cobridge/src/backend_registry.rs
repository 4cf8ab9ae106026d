//! Backend registry.
//!
//! Maps backend names, as written in `[backend] driver`, to factories. The
//! registry is built at startup and handed to [`Service::from_config`];
//! there is no global state.
//!
//! [`Service::from_config`]: crate::Service::from_config

use crate::backends::register_all_backends;
use cobridge_common::config::BackendConfig;
use cobridge_common::xchg::{BackendError, BackendFactory, RegisterBackend};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Registry of available register backends, ordered by name.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in backend.
    ///
    /// # Errors
    /// `BackendError::DuplicateBackend` if two built-ins share a name.
    pub fn with_builtin() -> Result<Self, BackendError> {
        let mut registry = Self::new();
        register_all_backends(&mut registry)?;
        Ok(registry)
    }

    /// Register a backend factory under `name`.
    ///
    /// # Errors
    /// `BackendError::DuplicateBackend` if `name` is taken; the existing
    /// factory stays registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) -> Result<(), BackendError> {
        if self.factories.contains_key(name) {
            return Err(BackendError::DuplicateBackend(name.to_string()));
        }
        self.factories.insert(name, factory);
        debug!("Backend '{}' registered", name);
        Ok(())
    }

    /// Instantiate the backend registered as `name`, uninitialized.
    ///
    /// # Errors
    /// `BackendError::BackendNotFound` naming the backend and the available ones.
    pub fn create_backend(&self, name: &str) -> Result<Box<dyn RegisterBackend>, BackendError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(BackendError::BackendNotFound(format!(
                "'{}' (available: {})",
                name,
                self.list_backends().join(", ")
            ))),
        }
    }

    /// Create and initialize the backend selected by `config.driver`.
    pub fn init_backend(&self, config: &BackendConfig) -> Result<Box<dyn RegisterBackend>, BackendError> {
        let mut backend = self.create_backend(&config.driver)?;
        backend.init(config)?;
        info!("Backend '{}' v{} ready", backend.name(), backend.version());
        Ok(backend)
    }

    /// Registered backend names, sorted.
    pub fn list_backends(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobridge_common::xchg::{ExchangeFuture, RegisterRequest, ValueSlot};

    /// Fills every slot with its register index.
    struct IndexBackend;

    impl RegisterBackend for IndexBackend {
        fn name(&self) -> &'static str {
            "index"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, config: &BackendConfig) -> Result<(), BackendError> {
            if config.strict {
                return Err(BackendError::InitFailed("index backend is never strict".into()));
            }
            Ok(())
        }

        fn exchange<'a>(
            &'a self,
            requests: &'a [RegisterRequest],
            values: &'a mut [ValueSlot],
        ) -> ExchangeFuture<'a> {
            Box::pin(async move {
                for (req, slot) in requests.iter().zip(values.iter_mut()) {
                    slot.set_u16(req.register);
                }
                Ok(())
            })
        }

        fn shutdown(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn create_index_backend() -> Box<dyn RegisterBackend> {
        Box::new(IndexBackend)
    }

    fn config(driver: &str) -> BackendConfig {
        BackendConfig {
            driver: driver.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn registered_backend_is_created_by_name() {
        let mut reg = BackendRegistry::new();
        reg.register("index", create_index_backend).unwrap();

        let backend = reg.init_backend(&config("index")).unwrap();
        assert_eq!(backend.name(), "index");
    }

    #[test]
    fn unknown_backend_lists_the_available_ones() {
        let mut reg = BackendRegistry::new();
        reg.register("index", create_index_backend).unwrap();

        let Err(BackendError::BackendNotFound(msg)) = reg.create_backend("ethercat") else {
            panic!("expected BackendNotFound");
        };
        assert!(msg.contains("ethercat"), "{msg}");
        assert!(msg.contains("index"), "{msg}");
    }

    #[test]
    fn backends_are_listed_in_name_order() {
        let mut reg = BackendRegistry::new();
        reg.register("zeta", create_index_backend).unwrap();
        reg.register("alpha", create_index_backend).unwrap();
        assert_eq!(reg.list_backends(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn duplicate_name_is_rejected_and_first_kept() {
        let mut reg = BackendRegistry::new();
        reg.register("dup", create_index_backend).unwrap();
        assert_eq!(
            reg.register("dup", crate::backends::simulation::create_backend).err(),
            Some(BackendError::DuplicateBackend("dup".to_string()))
        );
        assert_eq!(reg.create_backend("dup").unwrap().name(), "index");
    }

    #[test]
    fn init_failure_is_reported() {
        let mut reg = BackendRegistry::new();
        reg.register("index", create_index_backend).unwrap();
        let strict = BackendConfig {
            strict: true,
            ..config("index")
        };
        assert!(matches!(
            reg.init_backend(&strict),
            Err(BackendError::InitFailed(_))
        ));
    }

    #[test]
    fn builtin_registry_initializes_simulation() {
        let reg = BackendRegistry::with_builtin().unwrap();
        assert_eq!(reg.list_backends(), vec!["simulation"]);

        let backend = reg.init_backend(&BackendConfig::default()).unwrap();
        assert_eq!(backend.name(), "simulation");

        assert!(matches!(
            reg.init_backend(&config("ethercat")),
            Err(BackendError::BackendNotFound(_))
        ));
    }
}
