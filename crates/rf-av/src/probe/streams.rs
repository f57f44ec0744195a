//! Grammar for ffmpeg stream-description lines.
//!
//! The info probe prints one line per elementary stream, e.g.
//! `Stream #0:1[0x1e]: Audio: ac3 (stereo)`. Matches are returned in
//! discovery order.

use regex::Regex;
use std::sync::OnceLock;

fn stream_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Stream #(?P<stream>\d+:\d+)\[0x(?:[0-9a-fA-F]+)\]: (?P<type>\w+): (?P<info>.*)")
            .unwrap()
    })
}

/// One matched stream-description line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLine {
    /// Stream identifier token, e.g. "0:1".
    pub index: String,
    /// Kind word as printed, e.g. "Audio".
    pub kind: String,
    /// Remaining free-text description.
    pub description: String,
}

/// Extract every stream-description line, in source order.
pub fn parse_stream_lines(text: &str) -> Vec<StreamLine> {
    stream_re()
        .captures_iter(text)
        .map(|c| StreamLine {
            index: c["stream"].to_string(),
            kind: c["type"].to_string(),
            description: c["info"].trim_end().to_string(),
        })
        .collect()
}
