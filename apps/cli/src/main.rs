mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cc1800_core::{
    Cc1800Device, CommandSequencer, NusbTransport, ObservableTransport, ToolConfig,
    TracingObserver,
};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "USB boot tool for the ChinaChip CC1800 SoC",
    after_help = "Use any number of consecutive commands as arguments:\n    write <address> <file>\n    read <address> <length> <file>\n    exec"
)]
struct Args {
    /// Load device/timeout settings from a TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to a TOML file and exit
    #[arg(long, conflicts_with = "commands")]
    save_config: Option<PathBuf>,

    /// USB vendor ID override (hex or decimal)
    #[arg(long, value_parser = parse_u16)]
    vid: Option<u16>,

    /// USB product ID override (hex or decimal)
    #[arg(long, value_parser = parse_u16)]
    pid: Option<u16>,

    /// Per-transfer timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Commands: write <address> <file> | read <address> <length> <file> | exec
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let value = commands::parse_u32(s).map_err(|e| e.to_string())?;
    u16::try_from(value).map_err(|_| format!("value '{}' does not fit 16 bits", s))
}

fn build_config(args: &Args) -> Result<ToolConfig> {
    let mut config = match &args.config {
        Some(path) => ToolConfig::load_from_file(path)
            .with_context(|| format!("cannot load config '{}'", path.display()))?,
        None => ToolConfig::default(),
    };
    if let Some(vid) = args.vid {
        config.vendor_id = vid;
    }
    if let Some(pid) = args.pid {
        config.product_id = pid;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        info!(path = %path.display(), "Saved configuration");
        return Ok(());
    }

    // Reject malformed command lines before touching the device
    let commands = commands::parse_commands(&args.commands)?;
    if commands.is_empty() {
        anyhow::bail!("no commands given (see --help)");
    }
    let (operations, mut sink) = commands::load_operations(&commands)?;

    let transport = NusbTransport::open_with_config(&config).context("cannot open CC1800 device")?;

    let observer = Arc::new(TracingObserver);
    let observed = ObservableTransport::new(&transport, observer.clone());
    let mut device = Cc1800Device::new(&observed).with_timeout(config.timeout());

    let report = CommandSequencer::with_observer(observer).run(&mut device, &operations, &mut sink)?;

    if !report.verified_clean() {
        warn!(
            mismatches = report.mismatches.len(),
            "Some writes did not verify"
        );
    }
    info!(
        completed = report.completed,
        written = report.bytes_written,
        read = report.bytes_read,
        "Done"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("CC1800 usbtool v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
