use prometheus::Registry;
use variant_builder::metrics::{render, Metrics};

#[test]
fn counters_are_registered() {
    let registry = Registry::new();
    let metrics = Metrics::new(&registry).unwrap();
    metrics.rejections.inc();

    let text = render(&registry).unwrap();
    assert!(text.contains("variant_rejections_total 1"));
    assert!(text.contains("variant_attempts_total 0"));
}

#[test]
fn registering_twice_on_one_registry_fails() {
    let registry = Registry::new();
    Metrics::new(&registry).unwrap();
    assert!(Metrics::new(&registry).is_err());
}
