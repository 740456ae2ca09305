//! Per-key conflict resolution.
//!
//! A conflict is a key present on both sides with differing values. The
//! strategy decides which value survives; only `Interactive` consults an
//! outside party, through a [`ConflictPrompt`].

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// How conflicting keys are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Ask for every conflicting key.
    #[default]
    Interactive,
    /// Keep the local value.
    Ours,
    /// Take the remote value.
    Theirs,
    /// Take the remote value. The vault is versioned and treated as the
    /// authoritative source; no timestamps are compared.
    Newest,
}

impl ConflictStrategy {
    /// The decision this strategy makes without asking anyone, if any.
    pub fn fixed_resolution(self) -> Option<Resolution> {
        match self {
            ConflictStrategy::Ours => Some(Resolution::UseLocal),
            ConflictStrategy::Theirs | ConflictStrategy::Newest => Some(Resolution::UseRemote),
            ConflictStrategy::Interactive => None,
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictStrategy::Interactive => "interactive",
            ConflictStrategy::Ours => "ours",
            ConflictStrategy::Theirs => "theirs",
            ConflictStrategy::Newest => "newest",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(ConflictStrategy::Interactive),
            "ours" | "local" => Ok(ConflictStrategy::Ours),
            "theirs" | "remote" => Ok(ConflictStrategy::Theirs),
            "newest" => Ok(ConflictStrategy::Newest),
            other => Err(SyncError::Config(format!(
                "unknown conflict strategy {other:?} (expected interactive, ours, theirs or newest)"
            ))),
        }
    }
}

/// Decision for a single conflicting key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    UseLocal,
    UseRemote,
    UseEdited(String),
    /// Keep the local value and report the key as unresolved.
    Skip,
}

/// Source of decisions for the interactive strategy.
pub trait ConflictPrompt: Send {
    /// Asks which value to keep for `key`.
    fn choose(&mut self, key: &str, local: &str, remote: &str) -> SyncResult<Resolution>;
}

/// Resolves one conflicting key.
///
/// The interactive strategy requires a prompt; without one the call fails
/// with a configuration error.
pub fn resolve(
    key: &str,
    local: &str,
    remote: &str,
    strategy: ConflictStrategy,
    prompt: Option<&mut dyn ConflictPrompt>,
) -> SyncResult<Resolution> {
    if let Some(fixed) = strategy.fixed_resolution() {
        return Ok(fixed);
    }
    match prompt {
        Some(prompt) => prompt.choose(key, local, remote),
        None => Err(SyncError::Config(
            "interactive conflict resolution needs a prompt".to_string(),
        )),
    }
}

/// Line-oriented prompt over any reader/writer pair (a terminal in practice).
///
/// Accepts `l`, `r`, `e` or `s`. After `e` the next line is taken as the
/// replacement value. End of input counts as skip.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    /// Creates a prompt reading from `input` and writing questions to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consumes the prompt, returning the writer.
    pub fn into_output(self) -> W {
        self.output
    }

    fn read_line(&mut self) -> SyncResult<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| SyncError::io("<stdin>", e))?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn write(&mut self, text: &str) -> SyncResult<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|()| self.output.flush())
            .map_err(|e| SyncError::io("<stdout>", e))
    }
}

impl<R: BufRead + Send, W: Write + Send> ConflictPrompt for LinePrompt<R, W> {
    fn choose(&mut self, key: &str, local: &str, remote: &str) -> SyncResult<Resolution> {
        self.write(&format!(
            "Conflict on {key}\n  local:  {}\n  remote: {}\n",
            local.escape_debug(),
            remote.escape_debug()
        ))?;

        loop {
            self.write("[l]ocal / [r]emote / [e]dit / [s]kip? ")?;
            let Some(answer) = self.read_line()? else {
                return Ok(Resolution::Skip);
            };
            match answer.trim().to_ascii_lowercase().as_str() {
                "l" | "local" => return Ok(Resolution::UseLocal),
                "r" | "remote" => return Ok(Resolution::UseRemote),
                "s" | "skip" => return Ok(Resolution::Skip),
                "e" | "edit" => {
                    self.write("new value: ")?;
                    return Ok(match self.read_line()? {
                        Some(value) => Resolution::UseEdited(value),
                        None => Resolution::Skip,
                    });
                }
                _ => self.write("please answer l, r, e or s\n")?,
            }
        }
    }
}
