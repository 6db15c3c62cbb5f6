//! Configuration management
//!
//! Handles config.toml and the forwarding settings derived from it.

mod types;
mod validation;

pub use types::*;
pub use validation::{ValidationResult, validate};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();

        assert_eq!(config.forwarding, ForwardingConfig::default());
        assert_eq!(config.forwarding.mode, ForwardingMode::Direct);
        assert_eq!(config.forwarding.batch_size, 128);
        assert_eq!(config.forwarding.queue_capacity, 2048);
        assert_eq!(
            config.interfaces.keys().collect::<Vec<_>>(),
            vec!["tun11", "tun22"]
        );
        assert_eq!(config.interfaces["tun22"].address, "10.0.2.1/24");
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
            [log]
            level = "debug"
            format = "json"

            [forwarding]
            mode = "queued"
            pooled = true
            batch_size = 64
            queue_capacity = 512

            [interfaces.left]
            address = "192.168.10.1/24"

            [interfaces.right]
            address = "192.168.20.1/24"
            mtu = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.forwarding.mode, ForwardingMode::Queued);
        assert!(config.forwarding.uses_pool());
        assert_eq!(config.forwarding.batch_size, 64);
        assert_eq!(config.forwarding.queue_capacity, 512);
        assert_eq!(config.interfaces["left"].mtu(), 1500);
        assert_eq!(config.interfaces["right"].mtu(), 9000);
    }

    #[test]
    fn test_pooled_without_queue_does_not_use_pool() {
        let config = parse("[forwarding]\npooled = true\n").unwrap();
        assert!(config.forwarding.pooled);
        assert!(!config.forwarding.uses_pool());
    }

    #[test]
    fn test_pooled_flag_alone_keeps_direct_mode() {
        let mut forwarding = ForwardingConfig::direct();
        forwarding.apply_flags(false, true);

        assert_eq!(forwarding.mode, ForwardingMode::Direct);
        assert!(forwarding.pooled);
        assert!(!forwarding.uses_pool());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut config = parse("[forwarding]\nmode = \"direct\"\n").unwrap();
        config.forwarding.apply_flags(true, true);
        assert_eq!(config.forwarding, ForwardingConfig::queued(true));

        // Flags never turn a configured feature off
        let mut config = parse("[forwarding]\nmode = \"queued\"\npooled = true\n").unwrap();
        config.forwarding.apply_flags(false, false);
        assert!(config.forwarding.uses_pool());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = parse("[forwarding]\nmode = \"turbo\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
