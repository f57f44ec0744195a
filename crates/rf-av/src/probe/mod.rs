//! Probe-output parsing.
//!
//! Two independent grammars over captured stage text: the dvdbackup disc
//! grammar and the ffmpeg stream-line grammar. Both are pure functions;
//! an absent pattern yields an empty result, never an error.

pub mod disc;
pub mod streams;

pub use disc::{parse_disc_info, DiscInfo};
pub use streams::{parse_stream_lines, StreamLine};
