// =============================================================================
// CONFIG — Paramètres du moteur
// =============================================================================

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::ConfigError;

/// Facteur miles → kilomètres utilisé par les exercices.
pub const DEFAULT_MILE_TO_KM: Decimal = Decimal::from_parts(16, 0, 0, false, 1);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Facteur appliqué aux kilométrages exprimés en miles
    pub mile_to_km: Decimal,
    /// Refuser une racine multipliée par une jointure (sinon : avertissement)
    pub strict_cardinality: bool,
    /// Niveau de log par défaut si RUST_LOG est absent
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mile_to_km: DEFAULT_MILE_TO_KM,
            strict_cardinality: true,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Lit `FLEETQL_MILE_TO_KM`, `FLEETQL_STRICT_CARDINALITY` et `RUST_LOG`.
    /// Les variables absentes gardent leur valeur par défaut.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();

        if let Some(raw) = lookup("FLEETQL_MILE_TO_KM") {
            config.mile_to_km = Decimal::from_str(raw.trim())
                .ok()
                .filter(|d| d.is_sign_positive() && !d.is_zero())
                .ok_or(ConfigError::InvalidVar { name: "FLEETQL_MILE_TO_KM", value: raw })?;
        }
        if let Some(raw) = lookup("FLEETQL_STRICT_CARDINALITY") {
            config.strict_cardinality = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "FLEETQL_STRICT_CARDINALITY",
                        value: raw,
                    })
                }
            };
        }
        if let Some(level) = lookup("RUST_LOG") {
            config.log_level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.mile_to_km.to_string(), "1.6");
        assert!(config.strict_cardinality);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("FLEETQL_MILE_TO_KM", "1.609"),
            ("FLEETQL_STRICT_CARDINALITY", "off"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.mile_to_km, Decimal::new(1609, 3));
        assert!(!config.strict_cardinality);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_factor_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("FLEETQL_MILE_TO_KM", "-2")])).unwrap_err();
        assert!(err.to_string().contains("FLEETQL_MILE_TO_KM"));
    }
}
