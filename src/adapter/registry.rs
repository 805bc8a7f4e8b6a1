//! Engine constructor registry.
//!
//! Engines register a constructor under their [`EngineType`]; callers build
//! an adapter from a [`RouterConfig`] without naming the engine type.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::RouterAdapter;
use crate::config::{validate_config, ConfigError, EngineType, RouterConfig};
use crate::error::AdapterError;

/// Builds an adapter from an already validated config.
pub type AdapterConstructor =
    Arc<dyn Fn(RouterConfig) -> Result<Box<dyn RouterAdapter>, AdapterError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct EngineRegistry {
    constructors: HashMap<EngineType, AdapterConstructor>,
}

impl EngineRegistry {
    /// A registry with no engines.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every engine this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        crate::engines::register_builtin(&mut registry);
        registry
    }

    /// Register `engine`, replacing and returning any earlier constructor.
    pub fn register(&mut self, engine: EngineType, constructor: AdapterConstructor) -> Option<AdapterConstructor> {
        self.constructors.insert(engine, constructor)
    }

    pub fn contains(&self, engine: EngineType) -> bool {
        self.constructors.contains_key(&engine)
    }

    pub fn engines(&self) -> Vec<EngineType> {
        let mut engines: Vec<EngineType> = self.constructors.keys().copied().collect();
        engines.sort_by_key(|e| e.as_str());
        engines
    }

    /// Validate `config` and build the adapter for its engine.
    pub fn create(&self, config: &RouterConfig) -> Result<Box<dyn RouterAdapter>, AdapterError> {
        let config = validate_config(config).map_err(|errors| AdapterError::Config(ConfigError::Validation(errors)))?;
        let constructor = self
            .constructors
            .get(&config.engine)
            .ok_or_else(|| AdapterError::UnknownEngine(config.engine.to_string()))?;

        tracing::debug!(engine = %config.engine, "creating router adapter");
        constructor(config)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines())
            .finish()
    }
}

fn global() -> &'static RwLock<EngineRegistry> {
    static GLOBAL: OnceLock<RwLock<EngineRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(EngineRegistry::with_builtin()))
}

/// Register an engine in the process-wide registry.
pub fn register_engine(engine: EngineType, constructor: AdapterConstructor) {
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(engine, constructor);
}

/// Build an adapter from the process-wide registry.
pub fn new_router_adapter(config: &RouterConfig) -> Result<Box<dyn RouterAdapter>, AdapterError> {
    let registry = global().read().unwrap_or_else(PoisonError::into_inner).clone();
    registry.create(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_both_engines() {
        let registry = EngineRegistry::with_builtin();
        assert_eq!(registry.engines(), [EngineType::Axum, EngineType::Hyper]);

        for engine in EngineType::ALL {
            let adapter = registry.create(&RouterConfig::for_engine(engine)).unwrap();
            assert_eq!(adapter.engine(), engine);
            assert!(adapter.local_addr().is_none());
        }
    }

    #[test]
    fn unregistered_engine_is_unknown() {
        let registry = EngineRegistry::empty();
        let err = registry
            .create(&RouterConfig::for_engine(EngineType::Hyper))
            .err()
            .expect("empty registry must fail");
        assert!(matches!(err, AdapterError::UnknownEngine(name) if name == "hyper"));
    }

    #[test]
    fn invalid_config_is_rejected_before_construction() {
        let mut config = RouterConfig::for_engine(EngineType::Axum);
        config.port = 70_000;
        let err = EngineRegistry::with_builtin().create(&config).err().expect("port out of range");
        assert!(matches!(err, AdapterError::Config(ConfigError::Validation(_))));
    }
}
