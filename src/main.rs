mod cli;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::events::{EventBus, EventPayload};
use rf_core::params::ParameterStore;
use rf_pipeline::{ExtractionCoordinator, PathRequest, TranscodeCoordinator};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose
    // flag. Logs go to stderr so stage output on stdout stays clean.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ripforge=trace,rf_core=trace,rf_av=trace,rf_pipeline=trace".to_string()
        } else {
            "ripforge=info,rf_core=warn,rf_av=warn,rf_pipeline=warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            device,
            outdir,
            title,
            info_only,
            no_auto_cat,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(extract(
                cli.config.as_deref(),
                device,
                outdir,
                title,
                info_only,
                no_auto_cat,
            ))
        }
        Commands::Transcode {
            input,
            outdir,
            threads,
            crf,
            container,
            streams,
            info_only,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode(
                cli.config.as_deref(),
                input,
                outdir,
                threads,
                crf,
                container,
                streams,
                info_only,
            ))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ripforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Print bus traffic: stage lines verbatim on stdout, derived facts as
/// annotated one-liners.
fn spawn_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.payload {
                EventPayload::StageLine { line, .. } => println!("{line}"),
                EventPayload::MediaNameDetected { name } => {
                    println!("* Media name: {name}");
                }
                EventPayload::SourcePathAvailable { path } => {
                    println!("* Transcode source available: {}", path.display());
                }
                EventPayload::StreamsDiscovered { count } => {
                    println!("* Streams discovered: {count}");
                }
                _ => {}
            }
        }
    })
}

/// Cancel the active stage on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; cancelling active stage");
            handle.cancel();
        }
    });
    cancel
}

/// Interactive fallback for the concat stage: ask on the terminal when the
/// expected VOB directory is missing.
struct StdinPathRequest;

#[async_trait]
impl PathRequest for StdinPathRequest {
    async fn request_vob_dir(&self, suggested: &Path) -> Option<PathBuf> {
        use tokio::io::{AsyncBufReadExt, BufReader};

        eprintln!("VOB directory not found: {}", suggested.display());
        eprintln!("Enter VOB directory (blank line to cancel):");
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut line).await.is_err() {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn extract(
    config_path: Option<&Path>,
    device: Option<PathBuf>,
    outdir: Option<PathBuf>,
    title: Option<u32>,
    info_only: bool,
    no_auto_cat: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let store = Arc::new(ParameterStore::from_config(&config));
    if let Some(device) = device {
        store.set_device(device);
    }
    if let Some(outdir) = outdir {
        store.set_extraction_outdir(outdir);
    }
    if let Some(title) = title {
        store.set_title(title);
    }
    if no_auto_cat {
        store.set_auto_cat(false);
    }

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let bus = Arc::new(EventBus::default());
    let _printer = spawn_printer(&bus);
    let coordinator = Arc::new(
        ExtractionCoordinator::new(Arc::clone(&store), tools, bus)
            .with_path_request(Arc::new(StdinPathRequest)),
    );
    let cancel = cancel_on_interrupt();

    coordinator.launch_info(cancel.clone())?.await??;
    let summary = coordinator.disc_summary();
    if !summary.trim().is_empty() {
        println!("\n{summary}");
    }
    if coordinator.media_name().is_empty() {
        tracing::warn!("no disc title detected; the VOB path cannot be derived");
    }
    if info_only {
        return Ok(());
    }

    let result = coordinator.launch_run(cancel)?.await??;
    match result.exit_code {
        Some(0) => Ok(()),
        Some(rc) => anyhow::bail!("extraction exited with status {rc}"),
        None => anyhow::bail!("extraction was interrupted"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn transcode(
    config_path: Option<&Path>,
    input: Option<PathBuf>,
    outdir: Option<PathBuf>,
    threads: Option<u32>,
    crf: Option<u32>,
    container: Option<String>,
    streams: Option<Vec<String>>,
    info_only: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let store = Arc::new(ParameterStore::from_config(&config));
    if let Some(input) = input {
        store.set_input(input);
    }
    if let Some(outdir) = outdir {
        store.set_transcode_outdir(outdir);
    }
    if let Some(threads) = threads {
        store.set_threads(threads);
    }
    if let Some(crf) = crf {
        store.set_crf(crf);
    }
    if let Some(container) = container {
        store.set_container(container);
    }

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let bus = Arc::new(EventBus::default());
    let _printer = spawn_printer(&bus);
    let coordinator = Arc::new(TranscodeCoordinator::new(Arc::clone(&store), tools, bus));
    let cancel = cancel_on_interrupt();

    coordinator.launch_info(cancel.clone())?.await??;

    let discovered = store.streams();
    if discovered.is_empty() {
        anyhow::bail!("no streams discovered in the input");
    }
    println!();
    for stream in &discovered {
        println!("  [{}] {:?}: {}", stream.index, stream.kind, stream.description);
    }
    if info_only {
        return Ok(());
    }

    match streams {
        Some(indices) => {
            for index in &indices {
                store.set_stream_selected(index, true);
            }
        }
        None => store.select_all_streams(),
    }

    let result = coordinator.launch_run(cancel)?.await??;
    match result.exit_code {
        Some(0) => {
            let snap = store.transcode_snapshot()?;
            println!(
                "Encoded to {}",
                snap.outdir
                    .join(format!("output.{}", snap.container))
                    .display()
            );
            Ok(())
        }
        Some(rc) => anyhow::bail!("transcode exited with status {rc}"),
        None => anyhow::bail!("transcode was interrupted"),
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let registry = ToolRegistry::discover(&config.tools);

    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all stages.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified; checking built-in defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {warning}");
        }
    }
    println!("  Device: {}", config.extraction.device.display());
    println!(
        "  Extraction outdir: {}",
        config.extraction.outdir.display()
    );
    println!(
        "  Transcode: crf {}, {} thread(s), container {}",
        config.transcode.crf, config.transcode.threads, config.transcode.container
    );

    Ok(())
}
