//! Provider assembled from config files.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use resilience_pipeline::config::{load_config, ConfigError};
use resilience_pipeline::policy::ComponentKind;
use resilience_pipeline::{BackoffKind, Context, ErrorKind, Provider, ProviderError};

mod common;
use common::{always, Step};

const BASE: &str = r#"
[observability]
log_level = "warn"

[[entry]]
kind = "timeout"
name = "standard"
duration_ms = 500

[[entry]]
kind = "retry"
name = "gentle"
backoff = "exponential_jitter"
base_delay_ms = 5
max_delay_ms = 20
max_retries = 2

[[entry]]
kind = "circuit_breaker"
name = "payments-cb"
failure_threshold = 2
open_timeout_ms = 60000

[[entry]]
kind = "target"
name = "payments"
timeout = "standard"
retry = "gentle"
circuit_breaker = "payments-cb"
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_config_builds_working_executor() {
    let file = write_config(BASE);
    let config = load_config(file.path()).unwrap();

    let provider = Provider::new();
    assert_eq!(config.apply(&provider).unwrap(), 4);

    let policy = provider.resolve("payments").unwrap();
    assert_eq!(policy.timeout(), Some(Duration::from_millis(500)));
    assert_eq!(policy.retry().unwrap().backoff, BackoffKind::ExponentialJitter);

    // Three attempts allowed, the breaker opens on the second and stops the loop.
    let (op, calls) = always(Step::Transient);
    let err = provider
        .executor("payments")
        .unwrap()
        .execute(Context::background(), op)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn test_reload_adds_targets_and_keeps_breaker_state() {
    let provider = Provider::new();
    load_config(write_config(BASE).path())
        .unwrap()
        .apply(&provider)
        .unwrap();

    let breaker = provider.circuit_breaker("payments-cb").unwrap();
    let (op, _) = always(Step::Permanent);
    let op = Arc::new(op);
    for _ in 0..2 {
        let op = op.clone();
        provider
            .executor("payments")
            .unwrap()
            .execute(Context::background(), move |ctx| op(ctx))
            .await
            .unwrap_err();
    }
    assert_eq!(breaker.stats().total_failures, 2);

    let extended = format!(
        "{}\n[[entry]]\nkind = \"target\"\nname = \"refunds\"\ncircuit_breaker = \"payments-cb\"\n",
        BASE
    );
    let added = load_config(write_config(&extended).path())
        .unwrap()
        .apply(&provider)
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(provider.targets(), vec!["payments".to_string(), "refunds".to_string()]);

    let refunds = provider.resolve("refunds").unwrap();
    assert!(Arc::ptr_eq(refunds.circuit_breaker().unwrap(), &breaker));

    let (healthy, healthy_calls) = always(Step::Succeed);
    let err = provider
        .executor("refunds")
        .unwrap()
        .execute(Context::background(), healthy)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert_eq!(healthy_calls.count(), 0);
}

#[test]
fn test_invalid_config_is_rejected_before_registration() {
    let file = write_config(
        r#"
[[entry]]
kind = "circuit_breaker"
name = "cb"
failure_threshold = 0

[[entry]]
kind = "target"
name = "api"
timeout = "missing"
"#,
    );

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_unknown_names_surface_on_resolve() {
    let provider = Provider::new();
    provider
        .register_target(
            "orphan",
            resilience_pipeline::TargetBinding::new().retry("nowhere"),
        )
        .unwrap();

    assert!(provider.contains(ComponentKind::Target, "orphan"));
    assert_eq!(
        provider.resolve("orphan").unwrap_err(),
        ProviderError::NotFound {
            kind: ComponentKind::Retry,
            name: "nowhere".into(),
        }
    );
    assert!(matches!(
        provider.executor("ghost").unwrap_err(),
        ProviderError::NotFound {
            kind: ComponentKind::Target,
            ..
        }
    ));
}
