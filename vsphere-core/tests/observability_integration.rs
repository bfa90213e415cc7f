//! Integration tests for logging and self-metrics setup.
//!
//! The global subscriber can be installed once per process, so everything
//! that depends on it runs in a single test.
//!
//! ```bash
//! cargo test --test observability_integration -- --nocapture
//! ```

use std::sync::Arc;
use vsphere_core::gateway::FakeGateway;
use vsphere_core::{
    init_observability, init_observability_from, MonitorConfig, OutputPoint, VsphereMonitor,
};

#[tokio::test]
async fn test_init_then_collect() {
    let config = MonitorConfig { log_level: "debug".to_string(), ..Default::default() };
    init_observability_from(&config).expect("first init succeeds");
    assert!(
        init_observability("info", None).is_err(),
        "a second subscriber must not replace the first"
    );

    // A cycle with the subscriber installed logs through every service.
    let gateway = Arc::new(FakeGateway::new(2).with_failing_ref("vm-1"));
    let mut monitor = VsphereMonitor::new(gateway, config).unwrap();

    let mut emitted = 0usize;
    monitor.collect(&mut |_: OutputPoint| emitted += 1).await.unwrap();

    // vm-1 is skipped; three objects with two records each remain.
    assert_eq!(emitted, 6);
}
