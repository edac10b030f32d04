use std::time::Duration;

use thiserror::Error;

fn joined(argv: &[String]) -> String {
    argv.join(" ")
}

fn detail(stdout: &str, stderr: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    text.trim().to_string()
}

/// Failure of a single external command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Non-zero exit, death by signal, or a control-plane call without the
    /// trailing `OK`.
    #[error("Command '{}' failed (exit code {exit_code:?}): {}", joined(.argv), detail(.stdout, .stderr))]
    Failed {
        argv: Vec<String>,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Command '{}' did not finish within {timeout:?}", joined(.argv))]
    Timeout { argv: Vec<String>, timeout: Duration },

    #[error("Failed to execute '{}': {message}", joined(.argv))]
    Launch { argv: Vec<String>, message: String },
}

impl CommandError {
    pub fn argv(&self) -> &[String] {
        match self {
            CommandError::Failed { argv, .. }
            | CommandError::Timeout { argv, .. }
            | CommandError::Launch { argv, .. } => argv,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }
}

/// Underlying reason a configuration sequence stopped partway.
#[derive(Error, Debug)]
pub enum SetupCause {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lookup(Box<WfdError>),
}

#[derive(Error, Debug)]
pub enum WfdError {
    #[error("{message}")]
    InterfaceNotFound {
        message: String,
        #[source]
        source: Option<CommandError>,
    },

    #[error("{message}")]
    Setup {
        message: String,
        #[source]
        source: SetupCause,
    },

    #[error("Session must be closed before it can be opened (device {0})")]
    NotClosed(String),
}

impl WfdError {
    pub fn setup(message: impl Into<String>, source: impl Into<SetupCause>) -> Self {
        WfdError::Setup {
            message: message.into(),
            source: source.into(),
        }
    }

    /// The command failure at the root of this error, if any.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            WfdError::InterfaceNotFound { source, .. } => source.as_ref(),
            WfdError::Setup { source, .. } => match source {
                SetupCause::Command(err) => Some(err),
                SetupCause::Lookup(inner) => inner.command_error(),
                SetupCause::Io(_) => None,
            },
            WfdError::NotClosed(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.command_error().is_some_and(CommandError::is_timeout)
    }
}

pub type Result<T> = std::result::Result<T, WfdError>;
