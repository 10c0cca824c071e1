use crate::config::{parse_duration, Config};
use crate::error::{Result, ScopeError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_apify(config, &mut errors);
        Self::validate_openai(config, &mut errors);
        Self::validate_polling(config, &mut errors);
        Self::validate_enrichment(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_storage(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScopeError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_apify(config: &Config, errors: &mut Vec<ValidationError>) {
        // The key itself is only required once a job is started
        if config.apify.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "apify.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }

        if config.apify.discovery_actor.is_empty() || config.apify.scrape_actor.is_empty() {
            errors.push(ValidationError::new(
                "apify",
                "Both discovery_actor and scrape_actor must be set",
            ));
        }

        if !config.apify.base_url.starts_with("http") {
            errors.push(ValidationError::new(
                "apify.base_url",
                format!("Invalid base URL: {}", config.apify.base_url),
            ));
        }
    }

    fn validate_openai(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.openai.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "openai.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.openai.model.is_empty() || config.openai.aggregate_model.is_empty() {
            errors.push(ValidationError::new(
                "openai.model",
                "Model name cannot be empty",
            ));
        }

        if config.openai.max_tokens == 0 || config.openai.aggregate_max_tokens == 0 {
            errors.push(ValidationError::new(
                "openai.max_tokens",
                "Token limits must be greater than 0",
            ));
        }
    }

    fn validate_polling(config: &Config, errors: &mut Vec<ValidationError>) {
        let polling = &config.polling;

        for (path, interval) in [
            ("polling.discovery_interval", &polling.discovery_interval),
            ("polling.scrape_interval", &polling.scrape_interval),
        ] {
            if parse_duration(interval).is_none() {
                errors.push(ValidationError::new(
                    path,
                    format!("Invalid duration format: {}", interval),
                ));
            }
        }

        if polling.discovery_max_attempts == 0 {
            errors.push(ValidationError::new(
                "polling.discovery_max_attempts",
                "Attempt budget must be greater than 0",
            ));
        }

        if polling.scrape_max_attempts == 0 {
            errors.push(ValidationError::new(
                "polling.scrape_max_attempts",
                "Attempt budget must be greater than 0",
            ));
        }
    }

    fn validate_enrichment(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.enrichment.batch_size == 0 {
            errors.push(ValidationError::new(
                "enrichment.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.enrichment.sampling
            && (config.enrichment.sample_per_polarity == 0
                || config.enrichment.sample_char_limit == 0)
        {
            errors.push(ValidationError::new(
                "enrichment.sample_per_polarity",
                "Sampling limits must be greater than 0 when sampling is enabled",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.search.mode;
        if mode != "balanced" && mode != "aggressive" {
            errors.push(ValidationError::new(
                "search.mode",
                format!("Mode must be 'balanced' or 'aggressive', got '{}'", mode),
            ));
        }

        if config.search.max_places == 0 {
            errors.push(ValidationError::new(
                "search.max_places",
                "Max places must be greater than 0",
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.history_limit == 0 {
            errors.push(ValidationError::new(
                "storage.history_limit",
                "History limit must be greater than 0",
            ));
        }

        let window = &config.storage.history_dedup_window;
        if parse_duration(window).is_none() {
            errors.push(ValidationError::new(
                "storage.history_dedup_window",
                format!("Invalid duration format: {}", window),
            ));
        }
    }
}
