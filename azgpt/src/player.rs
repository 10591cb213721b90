//! Playback of audio files through an external command-line player.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Players tried in order when none is configured.
pub const DEFAULT_PLAYERS: &[&str] = &[
    "mplayer", "afplay", "mpg123", "mpg321", "play", "omxplayer", "aplay", "cmdmp3", "cvlc",
];

/// Plays audio files by spawning a player process.
#[derive(Debug, Clone)]
pub struct AudioPlayer {
    candidates: Vec<String>,
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_PLAYERS.iter().map(|&p| p.to_owned()).collect(),
        }
    }
}

impl AudioPlayer {
    /// Creates a player trying [`DEFAULT_PLAYERS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a player that only uses `command`.
    #[must_use]
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            candidates: vec![command.into()],
        }
    }

    /// First candidate found on `PATH`.
    #[must_use]
    pub fn resolve(&self) -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        self.resolve_in(&path)
    }

    fn resolve_in(&self, search_path: &OsStr) -> Option<PathBuf> {
        self.candidates.iter().find_map(|name| {
            let name = Path::new(name);
            if name.components().count() > 1 {
                return name.is_file().then(|| name.to_path_buf());
            }
            std::env::split_paths(search_path)
                .map(|dir| dir.join(name))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Plays `file` and waits for the player to exit.
    ///
    /// # Errors
    ///
    /// Fails when no player is available, it cannot be started, or it exits
    /// unsuccessfully.
    pub async fn play(&self, file: &Path) -> Result<()> {
        let player = self.resolve().ok_or_else(|| {
            Error::playback(format!(
                "no audio player found (tried {})",
                self.candidates.join(", ")
            ))
        })?;
        debug!(player = %player.display(), file = %file.display(), "playing audio");

        let status = Command::new(&player)
            .arg(file)
            .status()
            .await
            .map_err(|e| Error::playback(format!("failed to start {}: {e}", player.display())))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::playback(format!(
                "{} exited with {status}",
                player.display()
            )))
        }
    }
}
