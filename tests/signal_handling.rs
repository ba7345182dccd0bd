//! Termination signals delivered to the test process itself.
//!
//! Kept in its own test binary so the signals reach no other test.
#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use tokio::time::timeout;

use pgprobe_service::shutdown::wait_for_signal;

fn send_signal(name: &str) {
    let status = Command::new("kill")
        .arg(format!("-{name}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("kill runs");
    assert!(status.success());
}

async fn receive(name: &str) -> &'static str {
    let waiter = tokio::spawn(wait_for_signal());
    // Let the waiter register its handlers before the signal is sent
    tokio::time::sleep(Duration::from_millis(200)).await;
    send_signal(name);

    timeout(Duration::from_secs(5), waiter)
        .await
        .expect("signal is observed")
        .unwrap()
}

#[tokio::test]
async fn test_sigint_and_sigterm_both_end_the_wait() {
    assert_eq!(receive("INT").await, "SIGINT");
    assert_eq!(receive("TERM").await, "SIGTERM");
}
