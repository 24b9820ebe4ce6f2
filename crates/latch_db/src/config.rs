//! Database tuning knobs.

use crate::ecs::DbError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Rows per arena page. Must be a non-zero power of two.
    pub rows_per_page: usize,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
}

impl DatabaseConfig {
    pub const DEFAULT_ROWS_PER_PAGE: usize = 64;

    pub fn validate(&self) -> Result<(), DbError> {
        if !self.rows_per_page.is_power_of_two() {
            return Err(DbError::InvalidConfig {
                reason: format!(
                    "rows_per_page must be a non-zero power of two, got {}",
                    self.rows_per_page
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DbError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            rows_per_page: Self::DEFAULT_ROWS_PER_PAGE,
            entity_capacity: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DatabaseConfig::default();
        assert_eq!(config.rows_per_page, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = DatabaseConfig::from_json_str(r#"{ "entity_capacity": 128 }"#).unwrap();
        assert_eq!(config.entity_capacity, 128);
        assert_eq!(config.rows_per_page, 64);
    }

    #[test]
    fn rejects_bad_page_size() {
        let err = DatabaseConfig::from_json_str(r#"{ "rows_per_page": 48 }"#).unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig { .. }));

        let zero = DatabaseConfig {
            rows_per_page: 0,
            ..DatabaseConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = DatabaseConfig::from_json_str("{ rows_per_page: }").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
