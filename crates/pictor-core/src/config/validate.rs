//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.concurrency must be > 0".into(),
            ));
        }
        if self.fetch.max_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.max_size_mb must be > 0".into(),
            ));
        }
        if self.fetch.min_width == 0 || self.fetch.min_height == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.min_width and fetch.min_height must be > 0".into(),
            ));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.timeout_ms must be > 0".into(),
            ));
        }
        if self.fetch.allowed_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "fetch.allowed_formats must not be empty".into(),
            ));
        }
        if self.thumbnail.size == 0 {
            return Err(ConfigError::ValidationError(
                "thumbnail.size must be > 0".into(),
            ));
        }
        if self.analysis.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "analysis.models must list at least one model".into(),
            ));
        }
        for model in &self.analysis.models {
            if model.trust_weight <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "analysis model '{}' has non-positive trust_weight",
                    model.id
                )));
            }
        }
        if self.analysis.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.concurrency must be > 0".into(),
            ));
        }
        if self.analysis.consensus_models == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.consensus_models must be > 0".into(),
            ));
        }
        if self.selection.criteria.is_empty() {
            return Err(ConfigError::ValidationError(
                "selection.criteria must not be empty".into(),
            ));
        }
        if self.selection.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "selection.top_k must be > 0".into(),
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "storage.batch_size must be > 0".into(),
            ));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must be > 0".into(),
            ));
        }
        for (name, limit) in [
            ("search", &self.search.rate_limit),
            ("analysis", &self.analysis.rate_limit),
            ("hosting", &self.hosting.rate_limit),
            ("storage", &self.storage.rate_limit),
        ] {
            if limit.rate == 0 || limit.window_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name}.rate_limit must have rate > 0 and window_ms > 0"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetch.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_validate_rejects_empty_model_list() {
        let mut config = Config::default();
        config.analysis.models.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("models"));
    }

    #[test]
    fn test_validate_rejects_non_positive_trust_weight() {
        let mut config = Config::default();
        config.analysis.models[0].trust_weight = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trust_weight"));
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut config = Config::default();
        config.search.rate_limit.rate = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_validate_rejects_empty_criteria() {
        let mut config = Config::default();
        config.selection.criteria.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("criteria"));
    }
}
