pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    CacheConfig, Config, DialogueConfig, GatewayConfig, RetryConfig, SessionsConfig, StoreConfig,
    TelegramConfig, SESSION_PERSISTENCE_MODES, STORE_BACKENDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert!(!config.store.backend.is_empty());
        assert!(config.cache.ttl_secs > 0);
        assert!(config.retry.backoff_factor >= 1.0);
    }
}
