use crate::config::Config;
use crate::error::ConfigError;

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.connection.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "connection.host".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if config.connection.port == 0 {
        errors.push(ConfigError::Validation {
            field: "connection.port".to_string(),
            message: "must not be 0".to_string(),
        });
    }

    for (i, spec) in config.debugger.breakpoints.iter().enumerate() {
        if spec.trim().is_empty() {
            errors.push(ConfigError::Validation {
                field: format!("debugger.breakpoints[{i}]"),
                message: "must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collapse a validation result into its first error.
pub(crate) fn first_error(result: Result<(), Vec<ConfigError>>) -> Result<(), ConfigError> {
    result.map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}
