//! Pure command construction for every pipeline stage.
//!
//! Each function maps a tool path and a launch-time snapshot to a
//! [`WorkerCommand`]; nothing here touches the filesystem, so a command can
//! be built (and tested) for paths that do not exist yet. Existence is the
//! coordinator's precondition check at launch time.

use std::path::{Path, PathBuf};

use rf_core::params::{ExtractionSnapshot, TranscodeSnapshot};
use rf_core::types::StreamKind;

use crate::worker::WorkerCommand;

/// Name of the extraction tool binary.
pub const EXTRACT_TOOL: &str = "dvdbackup";
/// Name of the transcode tool binary.
pub const TRANSCODE_TOOL: &str = "ffmpeg";

// ---------------------------------------------------------------------------
// Extraction workflow
// ---------------------------------------------------------------------------

/// Info probe: full disc information.
pub fn extraction_info(tool: &Path, snap: &ExtractionSnapshot) -> WorkerCommand {
    WorkerCommand::argv(vec![
        tool.display().to_string(),
        "-i".into(),
        snap.device.display().to_string(),
        "-I".into(),
    ])
}

/// Title copy: device, destination, selected title, extra flags.
pub fn extraction_run(tool: &Path, snap: &ExtractionSnapshot) -> WorkerCommand {
    let mut argv = vec![
        tool.display().to_string(),
        "-i".into(),
        snap.device.display().to_string(),
        "-o".into(),
        snap.outdir.display().to_string(),
        "-t".into(),
        snap.title.to_string(),
    ];
    argv.extend(snap.extra_flags.iter().cloned());
    WorkerCommand::argv(argv)
}

/// The VOB directory a completed rip is expected to land in.
pub fn vob_path(snap: &ExtractionSnapshot, media_name: &str) -> PathBuf {
    snap.outdir.join(media_name).join("VIDEO_TS")
}

/// Concatenation of all `*.VOB` files under `vob_dir` into `output.vob`.
///
/// Glob expansion and output redirection are the documented interface of
/// this stage, so the command is shell text; the directory is embedded
/// with full single-quote escaping rather than the bare space-escaping the
/// naive form would use.
pub fn concat(vob_dir: &Path) -> WorkerCommand {
    let quoted = shell_quote(&vob_dir.display().to_string());
    WorkerCommand::shell(format!(
        "cat {quoted}/*.VOB > {quoted}/output.vob"
    ))
}

/// POSIX single-quote escaping: wrap in `'…'`, embedded quotes as `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Transcode workflow
// ---------------------------------------------------------------------------

/// Info probe with enlarged analysis buffers, so irregular inputs
/// (concatenated VOBs in particular) still report every stream.
pub fn transcode_info(tool: &Path, snap: &TranscodeSnapshot) -> WorkerCommand {
    WorkerCommand::argv(vec![
        tool.display().to_string(),
        "-analyzeduration".into(),
        "100M".into(),
        "-probesize".into(),
        "100M".into(),
        "-i".into(),
        snap.input.display().to_string(),
    ])
}

/// The encode: map every selected stream, attach per-stream metadata for
/// selected audio/subtitle streams, re-encode video, pass audio and
/// subtitles through unchanged.
pub fn transcode_run(tool: &Path, snap: &TranscodeSnapshot) -> WorkerCommand {
    let mut argv = vec![
        tool.display().to_string(),
        "-i".into(),
        snap.input.display().to_string(),
    ];

    // Output-stream metadata targets count selected streams per kind,
    // matching how ffmpeg numbers output streams under selective -map.
    let mut audio_n = 0usize;
    let mut subtitle_n = 0usize;

    for stream in snap.streams.iter().filter(|s| s.selected) {
        argv.push("-map".into());
        argv.push(stream.index.clone());

        let tag = match stream.kind {
            StreamKind::Audio => {
                let t = format!("s:a:{audio_n}");
                audio_n += 1;
                Some(t)
            }
            StreamKind::Subtitle => {
                let t = format!("s:s:{subtitle_n}");
                subtitle_n += 1;
                Some(t)
            }
            // Other kinds never carry metadata arguments, populated or not.
            _ => None,
        };

        if let Some(tag) = tag {
            if let Some(ref lang) = stream.language {
                argv.push(format!("-metadata:{tag}"));
                argv.push(format!("language={lang}"));
            }
            if let Some(ref title) = stream.title {
                argv.push(format!("-metadata:{tag}"));
                argv.push(format!("title={title}"));
            }
        }
    }

    argv.extend([
        "-threads".to_string(),
        snap.threads.to_string(),
        "-codec:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        snap.crf.to_string(),
        "-codec:a".to_string(),
        "copy".to_string(),
        "-codec:s".to_string(),
        "copy".to_string(),
        snap.outdir
            .join(format!("output.{}", snap.container))
            .display()
            .to_string(),
    ]);

    WorkerCommand::argv(argv)
}
