//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries
//! tool-path overrides plus per-workflow parameter defaults. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub extraction: ExtractionConfig,
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.transcode.crf > 51 {
            warnings.push(format!(
                "transcode.crf {} is outside the libx264 range 0-51",
                self.transcode.crf
            ));
        }
        if self.transcode.threads == 0 {
            warnings.push("transcode.threads is 0; ffmpeg will pick a thread count".into());
        }
        if self.extraction.title == 0 {
            warnings.push("extraction.title is 0; dvdbackup titles are 1-based".into());
        }
        if let Some(ref p) = self.tools.dvdbackup_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.dvdbackup_path {} does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }
        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path {} does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub dvdbackup_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

/// Extraction workflow defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub device: PathBuf,
    pub outdir: PathBuf,
    #[serde(default = "default_title")]
    pub title: u32,
    #[serde(default = "default_extra_flags")]
    pub extra_flags: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_cat: bool,
}

fn default_title() -> u32 {
    1
}

fn default_extra_flags() -> Vec<String> {
    vec!["-v".into(), "-p".into()]
}

fn default_true() -> bool {
    true
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/sr0"),
            outdir: default_outdir(),
            title: default_title(),
            extra_flags: default_extra_flags(),
            auto_cat: true,
        }
    }
}

/// Transcode workflow defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub input: Option<PathBuf>,
    pub outdir: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn default_crf() -> u32 {
    21
}

fn default_container() -> String {
    "mkv".into()
}

fn default_outdir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("Videos")
        .join("temp")
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            input: None,
            outdir: default_outdir(),
            threads: default_threads(),
            crf: default_crf(),
            container: default_container(),
        }
    }
}
