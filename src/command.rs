//! External command execution.
//!
//! Every side effect this crate has on the host goes through a [`Shell`]:
//! short-lived configuration commands via [`Shell::run`] and
//! [`Shell::run_control_plane`], and supervised daemons via
//! [`Shell::spawn_background`]. [`SystemShell`] is the real implementation;
//! tests substitute a recording fake.
//!
//! # Success criteria
//!
//! - `run`: the process exits with code 0.
//! - `run_control_plane`: exit code 0 **and** stdout ends with `"OK\n"`.
//!   `wpa_cli` exits 0 even when the supplicant rejects a request and only
//!   reports `FAIL` on stdout, so both checks are needed.
//!
//! # Background processes
//!
//! Each background process leads its own process group and is signalled
//! through the group. A privilege wrapper such as `sudo` and the daemon it
//! starts therefore both receive SIGTERM and SIGKILL.

use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::error::CommandError;

/// Literal token `wpa_cli` prints after a successful request.
pub const CONTROL_PLANE_OK: &str = "OK\n";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long captured output may trail the exit of a bounded command.
const PIPE_GRACE: Duration = Duration::from_millis(100);

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn into_error(self, argv: &[String]) -> CommandError {
        CommandError::Failed {
            argv: argv.to_vec(),
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
        }
    }
}

/// A daemon started with [`Shell::spawn_background`].
pub trait BackgroundProcess: Send {
    fn id(&self) -> u32;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for the process to exit. Returns `true` once it
    /// has exited.
    fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Force the process down (SIGKILL) and reap it.
    fn kill(&mut self) -> io::Result<()>;
}

pub trait Shell {
    /// Run `argv` to completion and capture its output. Only launch
    /// failures and timeouts are errors here; exit codes are judged by
    /// [`Shell::run`] and [`Shell::run_control_plane`].
    fn execute(&self, argv: &[String]) -> Result<CommandOutput, CommandError>;

    /// Start `argv` detached from our stdio and hand back its handle.
    fn spawn_background(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>, CommandError>;

    fn run(&self, argv: &[String]) -> Result<String, CommandError> {
        debug!(command = %argv.join(" "), "running command");
        let output = self.execute(argv)?;
        if !output.success() {
            return Err(output.into_error(argv));
        }
        Ok(output.stdout)
    }

    fn run_control_plane(&self, argv: &[String]) -> Result<String, CommandError> {
        debug!(command = %argv.join(" "), "running control-plane command");
        let output = self.execute(argv)?;
        if !output.success() || !output.stdout.ends_with(CONTROL_PLANE_OK) {
            return Err(output.into_error(argv));
        }
        Ok(output.stdout)
    }
}

/// Runs commands on the host with `std::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemShell {
    timeout: Option<Duration>,
}

impl SystemShell {
    /// `timeout` bounds every call to [`Shell::execute`]; `None` waits
    /// forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn command_for(argv: &[String]) -> Result<Command, CommandError> {
    let (program, args) = argv.split_first().ok_or_else(|| CommandError::Launch {
        argv: Vec::new(),
        message: "empty command line".to_string(),
    })?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

fn launch_error(argv: &[String], err: io::Error) -> CommandError {
    CommandError::Launch {
        argv: argv.to_vec(),
        message: err.to_string(),
    }
}

/// Read a child pipe to the end on its own thread so a chatty process
/// cannot block on a full pipe while we poll it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Collect what a drain thread read. A grandchild that inherited the pipe
/// keeps it open after the command exits, so with a deadline we stop
/// waiting shortly after it and leave the thread behind.
fn collect(output: &Receiver<String>, deadline: Option<Instant>) -> String {
    let received = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            output.recv_timeout(remaining.max(PIPE_GRACE)).ok()
        }
        None => output.recv().ok(),
    };
    received.unwrap_or_else(|| {
        debug!("command output still open after exit, dropping it");
        String::new()
    })
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl Shell for SystemShell {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        let mut command = command_for(argv)?;
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| launch_error(argv, e))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        let status = match self.timeout {
            Some(timeout) => match wait_until(&mut child, started + timeout) {
                Ok(Some(status)) => status,
                Ok(None) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::Timeout {
                        argv: argv.to_vec(),
                        timeout,
                    });
                }
                Err(e) => return Err(launch_error(argv, e)),
            },
            None => child.wait().map_err(|e| launch_error(argv, e))?,
        };

        Ok(CommandOutput {
            stdout: collect(&stdout, deadline),
            stderr: collect(&stderr, deadline),
            exit_code: status.code(),
        })
    }

    fn spawn_background(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>, CommandError> {
        let mut command = command_for(argv)?;
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| launch_error(argv, e))?;
        debug!(command = %argv.join(" "), pid = child.id(), "spawned background process");
        Ok(Box::new(ChildProcess { child }))
    }
}

/// [`BackgroundProcess`] backed by a real child process leading its own
/// process group.
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    /// Signal every process in the group. The group outlives its leader
    /// while a grandchild is still running, so this does not check whether
    /// the child itself has exited. An empty group is not an error.
    fn signal_group(&self, sig: Signal) -> io::Result<()> {
        match signal::killpg(Pid::from_raw(self.child.id() as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl BackgroundProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.signal_group(Signal::SIGTERM)
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool> {
        Ok(wait_until(&mut self.child, Instant::now() + timeout)?.is_some())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.signal_group(Signal::SIGKILL)?;
        self.child.wait().map(|_| ())
    }
}
