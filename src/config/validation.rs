//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (targets reference defined components)
//! - Validate value ranges (thresholds > 0, max delay >= base delay)
//! - Detect duplicate names within a kind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{EntryConfig, PipelineConfig};
use crate::policy::ComponentKind;

/// A single semantic problem in a config file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} entry #{index} has an empty name")]
    EmptyName { kind: ComponentKind, index: usize },

    #[error("{kind} '{name}' is defined more than once")]
    DuplicateName { kind: ComponentKind, name: String },

    #[error("'{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("target '{target}' references unknown {kind} '{name}'")]
    UnknownReference {
        target: String,
        kind: ComponentKind,
        name: String,
    },
}

/// Validate the whole config, collecting every error.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen: HashSet<(ComponentKind, &str)> = HashSet::new();

    for (index, entry) in config.entries.iter().enumerate() {
        let kind = entry.kind();
        let name = entry.name();

        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyName { kind, index });
            continue;
        }
        if !seen.insert((kind, name)) {
            errors.push(ValidationError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }

        match entry {
            EntryConfig::Timeout(_) => {}
            EntryConfig::Retry(retry) => {
                if retry.max_delay_ms < retry.base_delay_ms {
                    errors.push(invalid(name, "max_delay_ms must not be less than base_delay_ms"));
                }
            }
            EntryConfig::CircuitBreaker(cb) => {
                if let Err(reason) = cb.to_breaker_config().validate() {
                    errors.push(invalid(name, reason));
                }
            }
            EntryConfig::Target(_) => {}
        }
    }

    for entry in &config.entries {
        let EntryConfig::Target(target) = entry else {
            continue;
        };
        for (kind, name) in target.references() {
            if !seen.contains(&(kind, name)) {
                errors.push(ValidationError::UnknownReference {
                    target: target.name.clone(),
                    kind,
                    name: name.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(name: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
