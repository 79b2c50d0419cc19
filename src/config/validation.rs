use super::models::{AttemptProfile, Config};
use crate::extractor::QualityHint;
use crate::humanize::HumanDuration;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("extractor.binary must not be empty")]
    EmptyBinary,

    #[error("jobs.url_pattern is not a valid regular expression: {0}")]
    InvalidUrlPattern(#[from] regex::Error),

    #[error("jobs.default_quality '{0}' is not one of 720p, 480p, best, worst")]
    UnknownDefaultQuality(String),

    #[error("{field} must be positive")]
    ZeroTimeout { field: String },

    #[error("{field} ({timeout}) must be shorter than jobs.timeout ({job_timeout})")]
    InvocationOutlivesJob {
        field: String,
        timeout: HumanDuration,
        job_timeout: HumanDuration,
    },

    #[error("storage.media_extension '{0}' must be a bare extension such as 'mp4'")]
    InvalidMediaExtension(String),

    #[error("storage.public_prefix '{0}' must start with '/' and must not end with '/'")]
    InvalidPublicPrefix(String),

    #[error("events.replay_capacity must be positive")]
    ZeroReplayCapacity,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_extractor(config)?;
    validate_jobs(config)?;
    validate_storage(config)?;
    validate_events(config)?;
    Ok(())
}

fn validate_extractor(config: &Config) -> Result<(), ValidationError> {
    if config.extractor.binary.as_os_str().is_empty() {
        return Err(ValidationError::EmptyBinary);
    }

    let job_timeout = config.jobs.timeout;
    let profiles = [
        ("extractor.probe.primary", &config.extractor.probe.primary),
        ("extractor.probe.fallback", &config.extractor.probe.fallback),
        ("extractor.download.primary", &config.extractor.download.primary),
        ("extractor.download.fallback", &config.extractor.download.fallback),
    ];

    for (field, profile) in profiles {
        validate_profile(field, profile, job_timeout)?;
    }

    Ok(())
}

/// Invocation bounds nest strictly inside the job bound
fn validate_profile(
    field: &str,
    profile: &AttemptProfile,
    job_timeout: HumanDuration,
) -> Result<(), ValidationError> {
    if profile.timeout.as_duration() == Duration::ZERO {
        return Err(ValidationError::ZeroTimeout {
            field: format!("{field}.timeout"),
        });
    }

    if profile.timeout >= job_timeout {
        return Err(ValidationError::InvocationOutlivesJob {
            field: format!("{field}.timeout"),
            timeout: profile.timeout,
            job_timeout,
        });
    }

    Ok(())
}

fn validate_jobs(config: &Config) -> Result<(), ValidationError> {
    if config.jobs.timeout.as_duration() == Duration::ZERO {
        return Err(ValidationError::ZeroTimeout {
            field: "jobs.timeout".to_string(),
        });
    }

    regex::Regex::new(&config.jobs.url_pattern)?;

    if QualityHint::parse(&config.jobs.default_quality) == QualityHint::Other {
        return Err(ValidationError::UnknownDefaultQuality(
            config.jobs.default_quality.clone(),
        ));
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let ext = &config.storage.media_extension;
    if ext.is_empty() || ext.contains(['.', '/', '\\']) {
        return Err(ValidationError::InvalidMediaExtension(ext.clone()));
    }

    let prefix = &config.storage.public_prefix;
    if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) || prefix == "/" {
        return Err(ValidationError::InvalidPublicPrefix(prefix.clone()));
    }

    Ok(())
}

fn validate_events(config: &Config) -> Result<(), ValidationError> {
    if config.events.replay_capacity == 0 {
        return Err(ValidationError::ZeroReplayCapacity);
    }
    Ok(())
}
