//! HAProxy supervision against a fake `haproxy` executable.

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{Fixture, FAKE_PID, FOREGROUND_MARKER, NOISY_MARKER, REJECTED_MARKER, SLOW_MARKER};
use lb_agent::haproxy::{ProcessSupervisor, SupervisorConfig, SupervisorError, SupervisorState};

fn supervisor(fixture: &Fixture) -> ProcessSupervisor {
    ProcessSupervisor::new(supervisor_config(fixture))
}

#[tokio::test]
async fn start_then_restart_hands_over_old_pid() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = supervisor(&fixture);
    assert_eq!(supervisor.state(), SupervisorState::NotStarted);

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    let pid = std::fs::read_to_string(&fixture.config.pid_file).unwrap();
    assert_eq!(pid.trim(), FAKE_PID);

    supervisor.restart().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);

    let invocations = fixture.haproxy_invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].starts_with("-D -f "));
    assert!(!invocations[0].contains("-sf"));
    assert!(invocations[1].ends_with(&format!("-sf {}", FAKE_PID)));
}

#[tokio::test]
async fn restart_without_pid_file_fails() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = supervisor(&fixture);

    let err = supervisor.restart().await.unwrap_err();
    assert!(matches!(err, SupervisorError::PidFile { .. }));
    assert!(fixture.haproxy_invocations().is_empty());
    assert_eq!(supervisor.state(), SupervisorState::NotStarted);
}

#[tokio::test]
async fn valid_candidate_passes_check_mode() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = supervisor(&fixture);

    supervisor.validate(&fixture.config_text()).await.unwrap();

    let invocations = fixture.haproxy_invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].starts_with("-c -f "));
    // The candidate is checked from the work directory, never in place.
    assert!(invocations[0].contains("lb-agent-check-"));
    assert!(!invocations[0].contains("zato.config"));
    assert_eq!(std::fs::read_dir(&fixture.config.work_dir).unwrap().count(), 0);
    assert_eq!(supervisor.state(), SupervisorState::NotStarted);
}

#[tokio::test]
async fn rejected_candidate_reports_diagnostics() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = supervisor(&fixture);

    let candidate = format!("{}\n{}\n", fixture.config_text(), REJECTED_MARKER);
    let err = supervisor.validate(&candidate).await.unwrap_err();

    match err {
        SupervisorError::CheckFailed(report) => {
            assert_eq!(report.code, Some(1));
            assert!(report.command.contains(" -c -f "));
            assert!(report.stderr.contains("unknown keyword 'syntax_error'"));
        }
        other => panic!("expected CheckFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_check_mode_times_out() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = ProcessSupervisor::new(SupervisorConfig {
        validate_timeout: Duration::from_millis(300),
        ..supervisor_config(&fixture)
    });

    let candidate = format!("{}\n# {}\n", fixture.config_text(), SLOW_MARKER);
    let started = std::time::Instant::now();
    let err = supervisor.validate(&candidate).await.unwrap_err();

    assert!(matches!(err, SupervisorError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn noisy_rejection_is_not_mistaken_for_a_timeout() {
    let fixture = Fixture::new(common::unused_port().await);
    let supervisor = supervisor(&fixture);

    let candidate = format!("{}\n# {}\n", fixture.config_text(), NOISY_MARKER);
    let err = supervisor.validate(&candidate).await.unwrap_err();

    match err {
        SupervisorError::CheckFailed(report) => {
            assert_eq!(report.code, Some(1));
            assert_eq!(report.stderr.len(), 200_000);
            assert!(report.stderr.chars().all(|c| c == 'w'));
        }
        other => panic!("expected CheckFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn output_of_process_running_past_the_bound_is_still_drained() {
    let fixture = Fixture::new(common::unused_port().await);
    let config_path = fixture.config_path();
    let text = format!("{}\n# {}\n", fixture.config_text(), FOREGROUND_MARKER);
    std::fs::write(&config_path, text).unwrap();

    let supervisor = ProcessSupervisor::new(SupervisorConfig {
        start_timeout: Duration::from_millis(300),
        ..supervisor_config(&fixture)
    });
    supervisor.start().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);

    // The process writes its output after the bound and only marks
    // completion if nothing cut its stdout short.
    let marker = std::path::PathBuf::from(format!("{}.out", fixture.config.pid_file.display()));
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(marker.exists(), "{} was never written", marker.display());
}

fn supervisor_config(fixture: &Fixture) -> SupervisorConfig {
    SupervisorConfig {
        haproxy_command: fixture.config.haproxy_command.clone(),
        config_path: fixture.config_path(),
        pid_path: fixture.config.pid_file.clone(),
        work_dir: fixture.config.work_dir.clone(),
        start_timeout: Duration::from_secs(2),
        validate_timeout: Duration::from_secs(2),
    }
}
