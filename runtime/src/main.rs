// Copyright 2026 PQC Timeline Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use compliance_runtime::cli;
use compliance_runtime::pipeline::RunOptions;
use pqc_compliance::Source;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pqc-scrape",
    about = "Scrape PQC certification sources into a unified compliance corpus",
    version,
    after_help = "Run 'pqc-scrape <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "PQC_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape sources, merge into the corpus and publish it if healthy
    Scrape {
        /// NIST CMVP (FIPS 140-3)
        #[arg(long)]
        nist: bool,
        /// NIST ACVP algorithm validations
        #[arg(long)]
        acvp: bool,
        /// Common Criteria portal
        #[arg(long)]
        cc: bool,
        /// ANSSI (France)
        #[arg(long)]
        anssi: bool,
        /// BSI (Germany)
        #[arg(long)]
        bsi: bool,
        /// ENISA EUCC
        #[arg(long)]
        enisa: bool,
        /// All sources (the default when no source flag is given)
        #[arg(long)]
        all: bool,
        /// Scrape even if the corpus is fresh
        #[arg(long)]
        force: bool,
        /// Publish even when a source regressed critically
        #[arg(long)]
        allow_regression: bool,
        /// Corpus file to write (defaults to PQC_OUTPUT or the data dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Re-normalize dates and algorithm names of a corpus in place
    Normalize {
        /// Corpus file
        path: Option<PathBuf>,
    },
    /// Validate every record of a corpus
    Validate {
        /// Corpus file
        path: Option<PathBuf>,
        /// Fail when any record is invalid
        #[arg(long)]
        strict: bool,
    },
    /// Compare per-source record counts against a previous corpus
    Health {
        /// Current corpus file
        path: Option<PathBuf>,
        /// Previous corpus file
        #[arg(long)]
        previous: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn selected_sources(flags: [(bool, Source); 6], all: bool) -> Vec<Source> {
    if all {
        return Vec::new();
    }
    flags
        .into_iter()
        .filter_map(|(on, source)| on.then_some(source))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags travel through the environment so every handler sees them.
    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(cli::output::QUIET_ENV, "1");
    }
    if cli.verbose {
        std::env::set_var(cli::output::VERBOSE_ENV, "1");
    }

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    init_tracing(level, cli.log_json);

    let result = match cli.command {
        Commands::Scrape {
            nist,
            acvp,
            cc,
            anssi,
            bsi,
            enisa,
            all,
            force,
            allow_regression,
            output,
        } => {
            let sources = selected_sources(
                [
                    (nist, Source::Nist),
                    (acvp, Source::Acvp),
                    (cc, Source::CommonCriteria),
                    (anssi, Source::Anssi),
                    (bsi, Source::Bsi),
                    (enisa, Source::Enisa),
                ],
                all,
            );
            let options = RunOptions {
                force,
                allow_regression,
                sources,
            };
            cli::scrape_cmd::run(options, output).await
        }
        Commands::Normalize { path } => cli::normalize_cmd::run(&cli::corpus_path(path)).await,
        Commands::Validate { path, strict } => {
            cli::validate_cmd::run(&cli::corpus_path(path), strict).await
        }
        Commands::Health { path, previous } => {
            cli::health_cmd::run(&cli::corpus_path(path), &previous).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pqc-scrape", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
