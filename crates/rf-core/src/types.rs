//! Core value types shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Workflow / Stage
// ---------------------------------------------------------------------------

/// One of the two independent tool workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// Disc extraction via dvdbackup.
    Extraction,
    /// Media transcoding via ffmpeg.
    Transcode,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Extraction => write!(f, "extraction"),
            Workflow::Transcode => write!(f, "transcode"),
        }
    }
}

/// One discrete external-command invocation within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Informational probe against the source.
    Info,
    /// The main copy / encode command.
    Run,
    /// Concatenation of copied source files (extraction only).
    Cat,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Info => write!(f, "info"),
            Stage::Run => write!(f, "run"),
            Stage::Cat => write!(f, "cat"),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamSpec
// ---------------------------------------------------------------------------

/// Kind of an elementary media stream discovered by the transcode probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl StreamKind {
    /// Parse the kind word from a probe stream line ("Video", "Audio", ...).
    /// Unrecognised words map to [`StreamKind::Other`].
    pub fn from_probe_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }

    /// Whether streams of this kind carry language/title metadata.
    pub fn carries_metadata(self) -> bool {
        matches!(self, StreamKind::Audio | StreamKind::Subtitle)
    }
}

/// One elementary stream discovered by the transcode info probe, plus the
/// collaborator-editable selection and metadata state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream identifier as printed by the probe (e.g. "0:1").
    pub index: String,
    /// Stream kind.
    pub kind: StreamKind,
    /// Free-text description from the probe line.
    pub description: String,
    /// Whether the stream is mapped into the encode.
    pub selected: bool,
    /// Language tag; present only for audio/subtitle streams.
    pub language: Option<String>,
    /// Human-readable title; present only for audio/subtitle streams.
    pub title: Option<String>,
}

impl StreamSpec {
    /// Create a freshly discovered stream: unselected, with placeholder
    /// metadata for audio/subtitle kinds and none for other kinds.
    pub fn discovered(index: impl Into<String>, kind: StreamKind, description: impl Into<String>) -> Self {
        let (language, title) = if kind.carries_metadata() {
            (Some("eng".to_string()), Some("English".to_string()))
        } else {
            (None, None)
        };
        Self {
            index: index.into(),
            kind,
            description: description.into(),
            selected: false,
            language,
            title,
        }
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Captured outcome of one stage run. Replaces any prior result for the
/// same stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Numeric exit status; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Full captured output (stdout and stderr interleaved).
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_display() {
        assert_eq!(Workflow::Extraction.to_string(), "extraction");
        assert_eq!(Workflow::Transcode.to_string(), "transcode");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Info.to_string(), "info");
        assert_eq!(Stage::Run.to_string(), "run");
        assert_eq!(Stage::Cat.to_string(), "cat");
    }

    #[test]
    fn kind_from_probe_word() {
        assert_eq!(StreamKind::from_probe_word("Video"), StreamKind::Video);
        assert_eq!(StreamKind::from_probe_word("Audio"), StreamKind::Audio);
        assert_eq!(StreamKind::from_probe_word("Subtitle"), StreamKind::Subtitle);
        assert_eq!(StreamKind::from_probe_word("Data"), StreamKind::Other);
        assert_eq!(StreamKind::from_probe_word("Attachment"), StreamKind::Other);
    }

    #[test]
    fn discovered_audio_gets_placeholder_metadata() {
        let spec = StreamSpec::discovered("0:1", StreamKind::Audio, "ac3 (stereo)");
        assert!(!spec.selected);
        assert_eq!(spec.language.as_deref(), Some("eng"));
        assert_eq!(spec.title.as_deref(), Some("English"));
    }

    #[test]
    fn discovered_video_has_no_metadata() {
        let spec = StreamSpec::discovered("0:0", StreamKind::Video, "mpeg2video");
        assert_eq!(spec.language, None);
        assert_eq!(spec.title, None);
    }

    #[test]
    fn stream_spec_serde_roundtrip() {
        let spec = StreamSpec::discovered("0:2", StreamKind::Subtitle, "dvd_subtitle");
        let json = serde_json::to_string(&spec).unwrap();
        let back: StreamSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
