//! Media playback on the sink once the P2P session is open.
//!
//! Playback itself belongs to an external player program; this module only
//! starts it for a media URI and stops it again.

use std::time::Duration;

use tracing::{info, warn};

use crate::command::{BackgroundProcess, Shell};
use crate::error::CommandError;

pub trait Player {
    /// Select the media to play (a file path or stream URL).
    fn open(&mut self, uri: &str);

    fn play(&mut self) -> Result<(), CommandError>;

    fn stop(&mut self);
}

/// Runs an external player command with the media URI appended.
pub struct ProcessPlayer<'a, S: Shell + ?Sized> {
    shell: &'a S,
    command: Vec<String>,
    grace: Duration,
    media: Option<String>,
    process: Option<Box<dyn BackgroundProcess>>,
}

impl<'a, S: Shell + ?Sized> ProcessPlayer<'a, S> {
    pub fn new(shell: &'a S, command: Vec<String>, grace: Duration) -> Self {
        Self {
            shell,
            command,
            grace,
            media: None,
            process: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.process.is_some()
    }
}

impl<S: Shell + ?Sized> Player for ProcessPlayer<'_, S> {
    fn open(&mut self, uri: &str) {
        self.media = Some(uri.to_string());
    }

    fn play(&mut self) -> Result<(), CommandError> {
        let Some(media) = self.media.clone() else {
            return Err(CommandError::Launch {
                argv: self.command.clone(),
                message: "no media opened".to_string(),
            });
        };
        self.stop();

        let mut argv = self.command.clone();
        argv.push(media.clone());
        let process = self.shell.spawn_background(&argv)?;
        info!(media = %media, pid = process.id(), "playback started");
        self.process = Some(process);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        let _ = process.terminate();
        if !matches!(process.wait_for_exit(self.grace), Ok(true)) {
            warn!(pid = process.id(), "player did not exit, killing it");
            let _ = process.kill();
        }
    }
}

impl<S: Shell + ?Sized> Drop for ProcessPlayer<'_, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShell;

    fn player(shell: &FakeShell) -> ProcessPlayer<'_, FakeShell> {
        let command = vec!["cvlc".to_string(), "--fullscreen".to_string()];
        ProcessPlayer::new(shell, command, Duration::from_millis(10))
    }

    #[test]
    fn play_without_media_fails() {
        let shell = FakeShell::new();
        let mut player = player(&shell);
        assert!(player.play().is_err());
        assert!(shell.spawned().is_empty());
    }

    #[test]
    fn plays_opened_media() {
        let shell = FakeShell::new();
        let mut player = player(&shell);
        player.open("file:///media/pi/intro.mp4");
        player.play().unwrap();
        assert!(player.is_playing());
        assert_eq!(shell.calls(), vec!["spawn cvlc --fullscreen file:///media/pi/intro.mp4"]);

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(shell.signals(), vec!["terminate"]);
    }

    #[test]
    fn replaying_stops_previous_instance() {
        let shell = FakeShell::new();
        let mut player = player(&shell);
        player.open("a.mp4");
        player.play().unwrap();
        player.open("b.mp4");
        player.play().unwrap();
        assert_eq!(shell.signals(), vec!["terminate"]);
        assert_eq!(shell.spawned().len(), 2);
    }
}
