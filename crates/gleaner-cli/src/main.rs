mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gleaner_types::{GleanConfig, CONFIG_FILENAME};

/// Gleaner -- drive a remote page to extract or inject content.
///
/// The target browser must already be running with remote debugging
/// enabled (e.g. `google-chrome --remote-debugging-port=9222`); gleaner
/// only connects.
#[derive(Parser, Debug)]
#[command(name = "gleaner", version, about)]
struct Cli {
    /// Path to a gleaner.toml (defaults to ./gleaner.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debugging endpoint host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Debugging endpoint port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Keyword to pick the page target (substring of title or URL)
    #[arg(long, global = true)]
    keyword: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the debuggable page targets
    Targets,

    /// Extract feed content structurally (scroll + in-page extraction)
    Harvest {
        /// Reveal+extract cycles to run
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Wait after each reveal, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Where to write the JSON result
        #[arg(long, short, default_value = "harvest.json")]
        output: PathBuf,
    },

    /// Extract via screen capture and external text recognition
    Capture {
        /// Capture cycles to run
        #[arg(long)]
        cycles: Option<u32>,

        /// Wait between captures, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Directory for raw capture images
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Capture region as "x,y,width,height"; sampled interactively
        /// (two clicks in the page) when omitted
        #[arg(long)]
        region: Option<String>,

        /// External recognition command reading PNG from stdin and
        /// printing text (e.g. "tesseract stdin stdout -l chi_sim+eng")
        #[arg(long)]
        recognizer: Option<String>,

        /// Where to write the JSON result
        #[arg(long, short, default_value = "captures.json")]
        output: PathBuf,
    },

    /// Inject content through the page's add-content dialog
    Inject {
        /// Local files to upload (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// URLs to add (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Text content to paste
        #[arg(long)]
        text: Option<String>,

        /// Read the pasted text from a file
        #[arg(long)]
        text_file: Option<PathBuf>,

        /// Where to write the JSON batch report
        #[arg(long, short, default_value = "inject.json")]
        output: PathBuf,
    },
}

/// Load configuration and apply the global CLI overrides.
fn effective_config(cli: &Cli) -> anyhow::Result<GleanConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| {
            let default = PathBuf::from(CONFIG_FILENAME);
            default.exists().then_some(default)
        });

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
            let config = GleanConfig::from_toml(&content)?;
            tracing::info!(path = %path.display(), "configuration loaded");
            config
        }
        None => GleanConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.endpoint.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.endpoint.port = port;
    }
    if let Some(keyword) = &cli.keyword {
        config.endpoint.target_keyword = Some(keyword.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = effective_config(&cli)?;

    match cli.command {
        Commands::Targets => commands::targets(&config).await,
        Commands::Harvest {
            max_cycles,
            delay_ms,
            output,
        } => {
            if let Some(max_cycles) = max_cycles {
                config.harvest.max_cycles = max_cycles;
            }
            if let Some(delay_ms) = delay_ms {
                config.harvest.cycle_delay_ms = delay_ms;
            }
            commands::harvest(&config, &output).await
        }
        Commands::Capture {
            cycles,
            delay_ms,
            output_dir,
            region,
            recognizer,
            output,
        } => {
            if let Some(cycles) = cycles {
                config.capture.cycles = cycles;
            }
            if let Some(delay_ms) = delay_ms {
                config.capture.delay_ms = delay_ms;
            }
            if let Some(dir) = output_dir {
                config.capture.output_dir = dir;
            }
            if let Some(spec) = region {
                config.capture.region = Some(commands::parse_region(&spec)?);
            }
            if let Some(command) = recognizer {
                config.capture.recognizer_command = Some(command);
            }
            commands::capture(&config, &output).await
        }
        Commands::Inject {
            files,
            urls,
            text,
            text_file,
            output,
        } => commands::inject(&config, files, urls, text, text_file, &output).await,
    }
}
