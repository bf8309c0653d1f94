//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BalancerConfig;
use crate::config::validation::validate_config;
use crate::error::ConfigError;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: BalancerConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Algorithm;

    #[test]
    fn test_minimal_config_parses() {
        let toml = r#"
            [[pools]]
            id = "web"
            algorithm = "round-robin"

            [[pools.backends]]
            id = "web-1"
            host = "127.0.0.1"
            port = 3000
        "#;
        let config: BalancerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pools.len(), 1);
        assert_eq!(config.pools[0].algorithm, Algorithm::RoundRobin);
        assert_eq!(config.pools[0].backends[0].port, 3000);
        assert!(config.pools[0].enabled);
    }

    #[test]
    fn test_rule_config_parses() {
        let toml = r#"
            [[rules]]
            id = "api-redirect"
            priority = 1

            [rules.condition]
            field = "path"
            operator = "starts-with"
            value = "/old-api"

            [rules.action]
            type = "redirect"
            location = "/api"
            status = 301
        "#;
        let config: BalancerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].priority, 1);
    }

    #[test]
    fn test_missing_file_errors() {
        let result = load_config(Path::new("/nonexistent/relayd.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
