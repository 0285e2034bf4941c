//! Named component registry and policy factory.
//!
//! # Responsibilities
//! - Store timeout, retry and circuit breaker definitions by name
//! - Bind target names to component names
//! - Resolve a target into a `Policy`
//!
//! # Design Decisions
//! - Readers load an immutable snapshot through `ArcSwap` and never block
//! - Writers are serialized, build the next snapshot from a copy and publish
//!   it in one store, so a resolve never sees a half-applied registration
//! - Breakers are created here and nowhere else; copying a snapshot copies
//!   the `Arc`, so one name always means one shared breaker

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::policy::executor::Executor;
use crate::policy::types::{Policy, TargetBinding};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, RetryConfig};

/// Registry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Timeout,
    Retry,
    CircuitBreaker,
    Target,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Timeout => write!(f, "timeout"),
            ComponentKind::Retry => write!(f, "retry"),
            ComponentKind::CircuitBreaker => write!(f, "circuit breaker"),
            ComponentKind::Target => write!(f, "target"),
        }
    }
}

/// Registration and resolution errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{kind} '{name}' is not registered")]
    NotFound { kind: ComponentKind, name: String },

    #[error("{kind} '{name}' is already registered")]
    AlreadyRegistered { kind: ComponentKind, name: String },

    #[error("invalid configuration for '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },
}

impl ProviderError {
    fn not_found(kind: ComponentKind, name: &str) -> Self {
        ProviderError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Registry {
    timeouts: HashMap<String, Duration>,
    retries: HashMap<String, RetryConfig>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    targets: HashMap<String, TargetBinding>,
}

fn insert_unique<V>(
    map: &mut HashMap<String, V>,
    kind: ComponentKind,
    name: &str,
    value: V,
) -> Result<(), ProviderError> {
    if map.contains_key(name) {
        return Err(ProviderError::AlreadyRegistered {
            kind,
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), value);
    Ok(())
}

/// Resolves target names into policies.
///
/// Construct one at startup and share it (`Arc<Provider>`) with everything
/// that executes calls.
pub struct Provider {
    registry: ArcSwap<Registry>,
    writer: Mutex<()>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = self.registry.load();
        f.debug_struct("Provider")
            .field("timeouts", &reg.timeouts.len())
            .field("retries", &reg.retries.len())
            .field("circuit_breakers", &reg.breakers.len())
            .field("targets", &reg.targets.len())
            .finish()
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        Self {
            registry: ArcSwap::from_pointee(Registry::default()),
            writer: Mutex::new(()),
        }
    }

    fn update<F>(&self, apply: F) -> Result<(), ProviderError>
    where
        F: FnOnce(&mut Registry) -> Result<(), ProviderError>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Registry::clone(&self.registry.load());
        apply(&mut next)?;
        self.registry.store(Arc::new(next));
        Ok(())
    }

    pub fn register_timeout(&self, name: &str, timeout: Duration) -> Result<(), ProviderError> {
        self.update(|reg| insert_unique(&mut reg.timeouts, ComponentKind::Timeout, name, timeout))?;
        tracing::info!(name, timeout = ?timeout, "Registered timeout");
        Ok(())
    }

    pub fn register_retry(&self, name: &str, config: RetryConfig) -> Result<(), ProviderError> {
        let backoff = config.backoff;
        let max_retries = config.max_retries;
        self.update(|reg| insert_unique(&mut reg.retries, ComponentKind::Retry, name, config))?;
        tracing::info!(name, backoff = ?backoff, max_retries, "Registered retry strategy");
        Ok(())
    }

    /// Register a breaker. Fails on an invalid config or a taken name.
    pub fn register_circuit_breaker(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<(), ProviderError> {
        config.validate().map_err(|reason| ProviderError::InvalidConfig {
            name: name.to_string(),
            reason: reason.to_string(),
        })?;

        self.update(|reg| {
            if reg.breakers.contains_key(name) {
                return Err(ProviderError::AlreadyRegistered {
                    kind: ComponentKind::CircuitBreaker,
                    name: name.to_string(),
                });
            }
            reg.breakers
                .insert(name.to_string(), CircuitBreaker::new(name, config));
            Ok(())
        })
    }

    /// Bind a target to component names. The names are checked on resolve.
    pub fn register_target(&self, name: &str, binding: TargetBinding) -> Result<(), ProviderError> {
        let described = format!("{:?}", binding);
        self.update(|reg| insert_unique(&mut reg.targets, ComponentKind::Target, name, binding))?;
        tracing::info!(name, binding = %described, "Registered target");
        Ok(())
    }

    /// Assemble the policy bound to `target`.
    pub fn resolve(&self, target: &str) -> Result<Arc<Policy>, ProviderError> {
        let reg = self.registry.load();
        let binding = reg
            .targets
            .get(target)
            .ok_or_else(|| ProviderError::not_found(ComponentKind::Target, target))?;

        let timeout = binding
            .timeout
            .as_deref()
            .map(|name| {
                reg.timeouts
                    .get(name)
                    .copied()
                    .ok_or_else(|| ProviderError::not_found(ComponentKind::Timeout, name))
            })
            .transpose()?;

        let retry = binding
            .retry
            .as_deref()
            .map(|name| {
                reg.retries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ProviderError::not_found(ComponentKind::Retry, name))
            })
            .transpose()?;

        let circuit_breaker = binding
            .circuit_breaker
            .as_deref()
            .map(|name| {
                reg.breakers
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ProviderError::not_found(ComponentKind::CircuitBreaker, name))
            })
            .transpose()?;

        Ok(Arc::new(Policy::new(timeout, retry, circuit_breaker)))
    }

    /// Resolve `target` and wrap the policy in an executor.
    pub fn executor(&self, target: &str) -> Result<Executor, ProviderError> {
        let policy = self.resolve(target)?;
        Ok(Executor::for_target(target, policy))
    }

    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.registry.load().breakers.get(name).cloned()
    }

    pub fn contains(&self, kind: ComponentKind, name: &str) -> bool {
        let reg = self.registry.load();
        match kind {
            ComponentKind::Timeout => reg.timeouts.contains_key(name),
            ComponentKind::Retry => reg.retries.contains_key(name),
            ComponentKind::CircuitBreaker => reg.breakers.contains_key(name),
            ComponentKind::Target => reg.targets.contains_key(name),
        }
    }

    /// Registered target names, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.load().targets.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self
            .registry
            .load()
            .breakers
            .values()
            .map(|cb| cb.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}
