//! Process-based command execution with a grace-then-kill watchdog.
//!
//! [`SystemRunner`] spawns the child in a fresh process group with its output
//! piped, drains stdout and stderr on helper threads, and blocks on the exit
//! status and on both drains. When the request carries a timeout, a watchdog
//! thread waits on the deadline independently of those blocking waits. On
//! expiry it sends `SIGTERM` to the group, waits the grace interval, and then
//! sends `SIGKILL`, so tool helpers forked by the command die with it.
//!
//! A helper that detaches from the command's output may outlive it; one that
//! keeps the pipes open counts against the command's timeout.

use std::io::{BufReader, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::ExecError;
use crate::request::{CommandOutput, CommandRequest};
use crate::runner::CommandRunner;

/// Tracing target for command execution.
const EXEC_TARGET: &str = "telstack_exec::process";

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError> {
        run_supervised(request)
    }
}

fn run_supervised(request: &CommandRequest) -> Result<CommandOutput, ExecError> {
    let program = request.program();
    let mut command = Command::new(program);
    command
        .args(request.arguments())
        .envs(request.envs().iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    debug!(
        target: EXEC_TARGET,
        command = %request,
        timeout_ms = request.timeout().map(duration_millis),
        "spawning command"
    );

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|source| ExecError::from_spawn(program, source))?;
    let group = process_group(program, &child)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let watchdog = request
        .timeout()
        .map(|timeout| Watchdog::arm(program, group, timeout, request.grace()));

    // The watchdog stays armed until both pipes close: a backgrounded
    // grandchild holding them keeps the command alive past the leader's exit.
    let status = wait_child(program, &mut child);
    let stdout = collect(program, stdout);
    let stderr = collect(program, stderr);
    let timed_out = watchdog.is_some_and(Watchdog::disarm);

    let output = CommandOutput {
        exit_code: status?.code(),
        stdout: stdout?,
        stderr: stderr?,
        timed_out,
        elapsed: started.elapsed(),
    };

    debug!(
        target: EXEC_TARGET,
        command = %request,
        exit_code = output.exit_code,
        timed_out = output.timed_out,
        elapsed_ms = duration_millis(output.elapsed),
        "command finished"
    );
    Ok(output)
}

fn process_group(program: &str, child: &Child) -> Result<Pid, ExecError> {
    let raw = child.id();
    i32::try_from(raw)
        .map(Pid::from_raw)
        .map_err(|_| ExecError::InvalidPid {
            program: program.to_owned(),
            pid: raw,
        })
}

fn wait_child(program: &str, child: &mut Child) -> Result<std::process::ExitStatus, ExecError> {
    child.wait().map_err(|source| ExecError::Io {
        program: program.to_owned(),
        source: Arc::new(source),
    })
}

/// Output pipe being drained on a helper thread.
type Drain = Option<JoinHandle<std::io::Result<String>>>;

trait PipeSource: Read + Send + 'static {}
impl PipeSource for ChildStdout {}
impl PipeSource for ChildStderr {}

fn drain<P: PipeSource>(pipe: Option<P>) -> Drain {
    pipe.map(|source| {
        thread::spawn(move || -> std::io::Result<String> {
            let mut buffer = Vec::new();
            BufReader::new(source).read_to_end(&mut buffer)?;
            Ok(String::from_utf8_lossy(&buffer).into_owned())
        })
    })
}

fn collect(program: &str, handle: Drain) -> Result<String, ExecError> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    match handle.join() {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(source)) => Err(ExecError::Io {
            program: program.to_owned(),
            source: Arc::new(source),
        }),
        Err(_) => Err(ExecError::OutputReader {
            program: program.to_owned(),
        }),
    }
}

/// Background timer enforcing a request's timeout.
struct Watchdog {
    done: Sender<()>,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    fn arm(program: &str, group: Pid, timeout: Duration, grace: Duration) -> Self {
        let (done, finished) = mpsc::channel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let program = program.to_owned();
        let handle = thread::spawn(move || {
            if !deadline_passed(&finished, timeout) {
                return;
            }
            flag.store(true, Ordering::SeqCst);
            warn!(
                target: EXEC_TARGET,
                program = %program,
                timeout_ms = duration_millis(timeout),
                "command exceeded its timeout; sending SIGTERM to its process group"
            );
            signal_group(&program, group, Signal::SIGTERM);

            if !deadline_passed(&finished, grace) {
                return;
            }
            warn!(
                target: EXEC_TARGET,
                program = %program,
                grace_ms = duration_millis(grace),
                "command ignored SIGTERM; sending SIGKILL to its process group"
            );
            signal_group(&program, group, Signal::SIGKILL);
        });
        Self {
            done,
            fired,
            handle,
        }
    }

    /// Stops the timer and reports whether it fired.
    fn disarm(self) -> bool {
        // The receiver is gone once the timer has run to completion.
        drop(self.done.send(()));
        if self.handle.join().is_err() {
            warn!(target: EXEC_TARGET, "watchdog thread panicked");
        }
        self.fired.load(Ordering::SeqCst)
    }
}

fn deadline_passed(finished: &Receiver<()>, wait: Duration) -> bool {
    matches!(finished.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
}

fn signal_group(program: &str, group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(source) => {
            let error = ExecError::Signal {
                program: program.to_owned(),
                pgid: group.as_raw(),
                source,
            };
            warn!(target: EXEC_TARGET, %error, "failed to signal command");
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
