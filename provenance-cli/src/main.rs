//! Provenance CLI - register content provenance and verify platform proofs.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid arguments, unrecognized URL)
  65  Verification failed or invalid manifest
  66  Input file missing or unreadable
  69  Network, provider or registry unavailable
  74  Cannot write output";

#[derive(Parser)]
#[command(name = "provenance")]
#[command(author, version, about = "Content provenance: upload, manifest, anchor and verify", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Print only essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// Output settings shared by every command.
#[derive(Clone, Copy, Debug)]
pub struct Output {
    pub format: OutputFormat,
    pub quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA3-256 content hash of a file
    Hash {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Upload a file to the configured content-addressed store providers
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Use the in-process mock provider instead of configured providers
        #[arg(long)]
        mock: bool,
    },

    /// Build (and optionally sign) a manifest for a file
    Manifest {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// CID the file was stored under
        #[arg(long)]
        cid: String,

        /// Publishing identity, e.g. did:ethr:0x...
        #[arg(long)]
        identity: String,

        /// File holding the hex-encoded owner key used to sign the manifest
        #[arg(long, value_name = "PATH")]
        key_file: Option<PathBuf>,

        /// Where to write the manifest (defaults to <FILE>.manifest.json)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Fetch and validate a manifest (https:// or ipfs://)
    Resolve {
        #[arg(value_name = "URI")]
        uri: String,
    },

    /// Anchor a manifest's hash in the registry
    Anchor {
        /// Path to the manifest JSON file
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Use an in-process ledger instead of the configured registry node
        #[arg(long)]
        mock: bool,
    },

    /// Produce the proof line to paste into a platform description
    SignProof {
        /// Content hash the proof covers (64 hex characters)
        #[arg(long, value_name = "HEX")]
        content_hash: String,

        /// File holding the hex-encoded owner key
        #[arg(long, value_name = "PATH")]
        key_file: PathBuf,

        /// Unix timestamp to sign (defaults to now)
        #[arg(long, value_name = "SECS")]
        timestamp: Option<i64>,
    },

    /// Verify that platform content carries a proof signed by the manifest's identity
    Verify {
        #[arg(value_name = "PLATFORM_URL")]
        url: String,

        #[arg(value_name = "MANIFEST_URI")]
        manifest_uri: String,

        /// Read the platform description from a file instead of the platform API
        #[arg(long, value_name = "PATH")]
        proof_file: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, color: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .init();
}

async fn run(command: Commands, output: Output) -> Result<()> {
    match command {
        Commands::Hash { file } => commands::hash::execute(file, output),
        Commands::Upload { file, mock } => commands::upload::execute(file, mock, output).await,
        Commands::Manifest {
            file,
            cid,
            identity,
            key_file,
            output: path,
        } => commands::manifest::execute(file, cid, identity, key_file, path, output),
        Commands::Resolve { uri } => commands::resolve::execute(uri, output).await,
        Commands::Anchor { manifest, mock } => commands::anchor::execute(manifest, mock, output).await,
        Commands::SignProof {
            content_hash,
            key_file,
            timestamp,
        } => commands::sign_proof::execute(content_hash, key_file, timestamp, output),
        Commands::Verify {
            url,
            manifest_uri,
            proof_file,
        } => commands::verify::execute(url, manifest_uri, proof_file, output).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
        Err(e) => e.exit(),
    };

    let ansi = match cli.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
            true
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
            false
        }
        ColorChoice::Auto => std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    };
    init_tracing(cli.verbose, ansi);

    let output = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    let exit = match run(cli.command, output).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
