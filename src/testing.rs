//! Recording fake [`Shell`] for unit tests.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::command::{BackgroundProcess, CommandOutput, Shell};
use crate::error::CommandError;

/// Scripted replies for every command line containing `needle`. Replies are
/// consumed front to back; the last one sticks.
struct Rule {
    needle: String,
    replies: VecDeque<CommandOutput>,
}

/// A background process the fake "spawned".
#[derive(Debug, Clone)]
pub struct Spawned {
    pub argv: Vec<String>,
    /// Contents of the file named by the last argument at spawn time.
    pub last_arg_file: Option<String>,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    rules: Vec<Rule>,
    spawned: Vec<Spawned>,
    signals: Vec<&'static str>,
    ignore_terminate: bool,
    fail_spawn: bool,
    running: bool,
}

#[derive(Clone, Default)]
pub struct FakeShell {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, needle: &str, reply: CommandOutput) {
        let mut state = lock(&self.state);
        if let Some(rule) = state.rules.iter_mut().find(|r| r.needle == needle) {
            rule.replies.push_back(reply);
        } else {
            state.rules.push(Rule {
                needle: needle.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
    }

    /// Exit 0 with `stdout` for commands containing `needle`.
    pub fn respond(&self, needle: &str, stdout: &str) {
        self.push(
            needle,
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        );
    }

    pub fn fail(&self, needle: &str, exit_code: i32, stderr: &str) {
        self.push(
            needle,
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: Some(exit_code),
            },
        );
    }

    /// Make spawned processes ignore SIGTERM.
    pub fn ignore_terminate(&self) {
        lock(&self.state).ignore_terminate = true;
    }

    pub fn fail_spawn(&self) {
        lock(&self.state).fail_spawn = true;
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Index of the first recorded call containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(needle))
    }

    pub fn spawned(&self) -> Vec<Spawned> {
        lock(&self.state).spawned.clone()
    }

    pub fn signals(&self) -> Vec<&'static str> {
        lock(&self.state).signals.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

impl Shell for FakeShell {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        let line = argv.join(" ");
        let mut state = lock(&self.state);
        state.calls.push(line.clone());
        let reply = state
            .rules
            .iter_mut()
            .find(|rule| line.contains(&rule.needle))
            .and_then(|rule| {
                if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                }
            });
        Ok(reply.unwrap_or_else(|| CommandOutput {
            stdout: "OK\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }))
    }

    fn spawn_background(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>, CommandError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("spawn {}", argv.join(" ")));
        if state.fail_spawn {
            return Err(CommandError::Launch {
                argv: argv.to_vec(),
                message: "No such file or directory (os error 2)".to_string(),
            });
        }
        let last_arg_file = argv
            .last()
            .filter(|arg| Path::new(arg).is_file())
            .and_then(|arg| fs::read_to_string(arg).ok());
        state.spawned.push(Spawned {
            argv: argv.to_vec(),
            last_arg_file,
        });
        state.running = true;
        Ok(Box::new(FakeProcess {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeProcess {
    state: Arc<Mutex<State>>,
}

impl BackgroundProcess for FakeProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.signals.push("terminate");
        if !state.ignore_terminate {
            state.running = false;
        }
        Ok(())
    }

    fn wait_for_exit(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(!lock(&self.state).running)
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.signals.push("kill");
        state.running = false;
        Ok(())
    }
}
