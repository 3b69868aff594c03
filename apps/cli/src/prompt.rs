//! Secrets are read line by line from stdin, never from argv.

use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use portal_records::PinPrompt;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

pub struct Terminal {
    reader: Mutex<BufReader<Stdin>>,
}

impl Default for Terminal {
    fn default() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

/// Drops the line terminator only; any other whitespace is part of the answer.
fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints `label` to stderr and reads one line without its terminator.
    /// `None` on EOF.
    async fn read_line(&self, label: &str) -> Result<Option<String>> {
        eprint!("{label}: ");
        std::io::stderr().flush().context("failed to flush prompt")?;

        let mut line = String::new();
        let mut reader = self.reader.lock().await;
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("failed to read from stdin")?;
        if bytes_read == 0 {
            return Ok(None);
        }
        Ok(Some(strip_line_ending(&line).to_string()))
    }

    /// One trimmed line, for codes and PINs.
    pub async fn ask(&self, label: &str) -> Result<Option<String>> {
        Ok(self
            .read_line(label)
            .await?
            .map(|answer| answer.trim().to_string()))
    }

    pub async fn require(&self, label: &str) -> Result<String> {
        self.ask(label)
            .await?
            .with_context(|| format!("{} is required", label.to_lowercase()))
    }

    /// A password exactly as typed.
    pub async fn secret(&self, label: &str) -> Result<String> {
        self.read_line(label)
            .await?
            .with_context(|| format!("{} is required", label.to_lowercase()))
    }
}

#[async_trait]
impl PinPrompt for Terminal {
    async fn ask_pin(&self) -> Option<String> {
        match self.ask("PIN").await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "PIN prompt failed");
                None
            }
        }
    }
}
