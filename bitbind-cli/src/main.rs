use anyhow::Result;
use bitbind_cli::commands::{self, decode::{DecodeOptions, Input}};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bitbind")]
#[command(about = "Bitbind - Decode bit streams against tagged record schemas", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one record from binary input
    Decode {
        /// Schema JSON file
        #[arg(short, long)]
        schema: String,

        /// Input file (use - for stdin)
        #[arg(short, long, conflicts_with = "hex", required_unless_present = "hex")]
        input: Option<String>,

        /// Input given as hex digits
        #[arg(long)]
        hex: Option<String>,

        /// Output JSON file for the decode report
        #[arg(short, long)]
        output: Option<String>,

        /// Print an indented trace of every codec invocation
        #[arg(long)]
        trace: bool,

        /// Write decode events as JSON to this file
        #[arg(long, value_name = "PATH")]
        events: Option<String>,

        /// Log decode events at debug level (shown with --verbose)
        #[arg(long)]
        log_events: bool,

        /// Replace a field's tag: FIELD=TAG[:key=value,...]
        #[arg(long = "override", value_name = "FIELD=TAG")]
        overrides: Vec<String>,
    },

    /// Show each field's effective tags and selected codec
    Tags {
        /// Schema JSON file
        #[arg(short, long)]
        schema: String,

        /// Output JSON file for the tag report
        #[arg(short, long)]
        output: Option<String>,

        /// Replace a field's tag: FIELD=TAG[:key=value,...]
        #[arg(long = "override", value_name = "FIELD=TAG")]
        overrides: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Execute command
    match cli.command {
        Commands::Decode {
            schema,
            input,
            hex,
            output,
            trace,
            events,
            log_events,
            overrides,
        } => {
            let source = match (input, hex) {
                (_, Some(digits)) => Input::Hex(digits),
                (Some(path), None) => Input::File(path),
                (None, None) => Input::File("-".to_string()),
            };
            let options = DecodeOptions {
                trace,
                record_events: false,
                events_path: events,
                log_events,
                overrides,
            };
            commands::decode::execute(&schema, &source, output.as_deref(), &options)
        }

        Commands::Tags {
            schema,
            output,
            overrides,
        } => commands::tags::execute(&schema, &overrides, output.as_deref()),
    }
}
