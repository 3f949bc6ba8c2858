//! Process-level tests running real `sh` and `sleep` children.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rstest::rstest;

use crate::{CommandRequest, CommandRunner, SystemRunner};

fn shell(script: &str) -> CommandRequest {
    CommandRequest::new("sh").args(["-c", script])
}

fn first_line_pid(stdout: &str) -> Pid {
    let raw: i32 = stdout
        .lines()
        .next()
        .and_then(|line| line.trim().parse().ok())
        .expect("stub printed its pid");
    Pid::from_raw(raw)
}

#[test]
fn captures_stdout_and_zero_exit() {
    let output = SystemRunner
        .run(&shell("printf 'pci:0000:04:00.0 wcte13xp+ d161:800b Wildcard TE133\\n'"))
        .expect("sh runs");
    assert!(output.success());
    assert_eq!(
        output.stdout,
        "pci:0000:04:00.0 wcte13xp+ d161:800b Wildcard TE133\n"
    );
    assert!(!output.timed_out);
}

#[rstest]
#[case::in_use(1)]
#[case::lsb_stopped(3)]
fn non_zero_exit_is_an_outcome_not_an_error(#[case] code: i32) {
    let script = format!("echo 'module busy' >&2; exit {code}");
    let output = SystemRunner.run(&shell(&script)).expect("sh runs");
    assert_eq!(output.exit_code, Some(code));
    assert_eq!(output.stderr.trim(), "module busy");
    assert!(!output.success());
}

#[test]
fn missing_program_is_reported_as_tool_missing() {
    let err = SystemRunner
        .run(&CommandRequest::new("telstack-test-no-such-tool"))
        .expect_err("program does not exist");
    assert!(err.is_tool_missing());
}

#[test]
fn passes_environment_overrides() {
    let request = shell("printf %s \"$DAHDI_CONF_FILE\"").env("DAHDI_CONF_FILE", "/var/tmp/x.conf");
    let output = SystemRunner.run(&request).expect("sh runs");
    assert_eq!(output.stdout, "/var/tmp/x.conf");
}

#[test]
fn fast_command_is_not_marked_timed_out() {
    let request = shell("exit 0").with_timeout(Duration::from_secs(5));
    let output = SystemRunner.run(&request).expect("sh runs");
    assert!(output.success());
    assert!(output.elapsed < Duration::from_secs(5));
}

#[test]
fn timeout_terminates_hanging_stub_within_bound() {
    let request = shell("echo $$; exec sleep 30")
        .with_timeout(Duration::from_millis(200))
        .with_grace(Duration::from_millis(100));

    let output = SystemRunner.run(&request).expect("stub runs");

    assert!(output.timed_out, "watchdog should have fired");
    assert_eq!(output.exit_code, None, "stub should die from a signal");
    assert!(
        output.elapsed < Duration::from_millis(500),
        "took {:?}",
        output.elapsed
    );
    let pid = first_line_pid(&output.stdout);
    assert_eq!(kill(pid, None), Err(Errno::ESRCH), "stub still running");
}

#[test]
fn stub_ignoring_sigterm_is_killed_after_grace() {
    let request = shell("trap '' TERM; echo $$; exec sleep 30")
        .with_timeout(Duration::from_millis(200))
        .with_grace(Duration::from_millis(100));

    let output = SystemRunner.run(&request).expect("stub runs");

    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
    assert!(
        output.elapsed >= Duration::from_millis(300),
        "SIGKILL must wait for the grace interval, took {:?}",
        output.elapsed
    );
    assert!(
        output.elapsed < Duration::from_secs(2),
        "took {:?}",
        output.elapsed
    );
    let pid = first_line_pid(&output.stdout);
    assert_eq!(kill(pid, None), Err(Errno::ESRCH), "stub still running");
}

#[test]
fn backgrounded_child_holding_output_is_bounded_by_the_timeout() {
    let request = shell("sleep 5 & echo started")
        .with_timeout(Duration::from_millis(200))
        .with_grace(Duration::from_millis(100));

    let output = SystemRunner.run(&request).expect("stub runs");

    assert!(output.timed_out, "watchdog should cover the open pipes");
    assert_eq!(output.exit_code, Some(0), "the leader itself exited");
    assert_eq!(output.stdout.trim(), "started");
    assert!(
        output.elapsed < Duration::from_secs(1),
        "took {:?}",
        output.elapsed
    );
}

#[test]
fn detached_child_does_not_hold_the_command() {
    let request = shell("sleep 1 >/dev/null 2>&1 & echo started")
        .with_timeout(Duration::from_secs(5));

    let output = SystemRunner.run(&request).expect("stub runs");

    assert!(!output.timed_out);
    assert!(output.success());
    assert!(
        output.elapsed < Duration::from_millis(900),
        "took {:?}",
        output.elapsed
    );
}
