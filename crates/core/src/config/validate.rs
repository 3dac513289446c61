use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Resource thresholds are percentages and moderate does not exceed high
/// - Timeouts and the worker limit are non-zero
/// - Post-success options are not both selected
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let r = &config.resources;
    for (name, value) in [
        ("resources.high_memory_percent", r.high_memory_percent),
        ("resources.high_cpu_percent", r.high_cpu_percent),
        ("resources.moderate_memory_percent", r.moderate_memory_percent),
        ("resources.moderate_cpu_percent", r.moderate_cpu_percent),
        ("resources.critical_memory_percent", r.critical_memory_percent),
    ] {
        if !(1.0..=100.0).contains(&value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between 1 and 100, got {}",
                name, value
            )));
        }
    }
    if r.moderate_memory_percent > r.high_memory_percent
        || r.moderate_cpu_percent > r.high_cpu_percent
    {
        return Err(ConfigError::ValidationError(
            "moderate resource thresholds cannot exceed high thresholds".to_string(),
        ));
    }

    if config.scheduler.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_workers cannot be 0".to_string(),
        ));
    }
    if config.tools.conversion_timeout_secs == 0 || config.tools.extraction_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "tool timeouts cannot be 0".to_string(),
        ));
    }

    let thresholds = &config.classification.thresholds;
    if thresholds.small_iso_max_bytes >= thresholds.large_iso_min_bytes {
        return Err(ConfigError::ValidationError(
            "classification.small_iso_max_bytes must be below large_iso_min_bytes".to_string(),
        ));
    }

    let post = &config.post_success;
    if post.move_to_backup && post.delete_originals {
        return Err(ConfigError::ValidationError(
            "post_success.move_to_backup and post_success.delete_originals are mutually exclusive"
                .to_string(),
        ));
    }
    if post.move_to_backup && post.backup_dir_name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "post_success.backup_dir_name cannot be empty".to_string(),
        ));
    }

    Ok(())
}
