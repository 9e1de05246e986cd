//! Output formatting for CLI commands.
//!
//! Every command produces a serializable result; text mode renders it for
//! humans and JSON mode prints it as-is.

use anyhow::Result;
use loam_core::ObjectId;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write `data` as JSON, or the text produced by `text_fn`.
    ///
    /// `text_fn` is only called in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write raw bytes to stdout (blob contents).
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    /// Write an error to stderr, as a JSON object in JSON mode.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    pub bare: bool,
    pub algorithm: String,
}

/// One blob stored by `hash-object`.
#[derive(Debug, Clone, Serialize)]
pub struct HashedObject {
    pub id: ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Output for `hash-object` command.
#[derive(Debug, Serialize)]
pub struct HashObjectOutput {
    pub success: bool,
    pub result_code: u8,
    pub objects: Vec<HashedObject>,
}

/// Output for `cat-file -t` and `cat-file -s`.
#[derive(Debug, Serialize)]
pub struct ObjectInfoOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: ObjectId,
    pub kind: String,
    pub size: u64,
    pub compressed: bool,
}

/// Output for `config get`.
#[derive(Debug, Serialize)]
pub struct ConfigGetOutput {
    pub success: bool,
    pub result_code: u8,
    pub key: String,
    pub value: String,
}

/// Output for `config set`.
#[derive(Debug, Serialize)]
pub struct ConfigSetOutput {
    pub success: bool,
    pub result_code: u8,
    pub key: String,
    pub value: String,
    pub path: String,
}

/// Output for `config locate`.
#[derive(Debug, Serialize)]
pub struct ConfigLocateOutput {
    pub success: bool,
    pub result_code: u8,
    pub system: Option<String>,
    pub global: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_error: Option<String>,
}

/// Output for `rm-tree` and `mkdir`.
#[derive(Debug, Serialize)]
pub struct PathOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
}
