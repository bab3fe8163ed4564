//! Tests for the audit log listener.

use tripwire::listeners::AuditListener;
use tripwire::violation::Listener;

use crate::support::{scenario_violation, SharedBuf};

#[tokio::test]
async fn audit_listener_logs_one_line_per_violation() {
    let buf = SharedBuf::new();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let listener = AuditListener;
    listener
        .on_violation(&scenario_violation())
        .await
        .expect("audit never fails");

    let logs = buf.contents();
    assert_eq!(logs.lines().count(), 1, "logs: {logs}");
    assert!(logs.contains("policy violation"));
    assert!(logs.contains("my-pod"));
    assert!(logs.contains("require-labels"));
    assert_eq!(listener.name(), "audit");
}
