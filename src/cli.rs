use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ripforge")]
#[command(author, version, about = "Disc extraction and transcode pipeline driver")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the disc and copy the selected title, concatenating VOBs
    Extract {
        /// Disc device node (default: config / /dev/sr0)
        #[arg(long)]
        device: Option<PathBuf>,

        /// Destination directory for the copied title
        #[arg(short, long)]
        outdir: Option<PathBuf>,

        /// Title number to copy (1-based)
        #[arg(short, long)]
        title: Option<u32>,

        /// Probe the disc and print its information, then stop
        #[arg(long)]
        info_only: bool,

        /// Do not chain into the concat stage after the copy
        #[arg(long)]
        no_auto_cat: bool,
    },

    /// Probe an input file for streams and encode the selection
    Transcode {
        /// Input file (default: config)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Destination directory for the encoded file
        #[arg(short, long)]
        outdir: Option<PathBuf>,

        /// Encoder thread count
        #[arg(long)]
        threads: Option<u32>,

        /// libx264 constant rate factor (0-51)
        #[arg(long)]
        crf: Option<u32>,

        /// Output container extension (e.g. mkv, mp4)
        #[arg(long)]
        container: Option<String>,

        /// Stream indices to map (e.g. 0:0,0:1); all streams if omitted
        #[arg(long, value_delimiter = ',')]
        streams: Option<Vec<String>>,

        /// Probe the input and print the stream list, then stop
        #[arg(long)]
        info_only: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
