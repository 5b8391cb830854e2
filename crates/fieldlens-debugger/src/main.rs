//! Command line front end for `fieldlens`.
//!
//! Loads a file (transparently gunzipping `.gz` input), runs one of the
//! built-in demo grammars over it and prints the entry tree, the stream
//! provenance of one field, a round-trip diff, or applies one edit.

mod cui;
mod formats;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tracing::Level;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the entry tree of a file
    Tree {
        /// Path to binary file (supports .gz (gzipped) and raw files)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Expand every array, not only the first elements
        #[arg(long)]
        all: bool,
    },
    /// Show which bytes of which stream a field was read from
    Chain {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Dotted field path, e.g. `records.0.data`
        #[arg(value_name = "PATH")]
        path: String,
    },
    /// Parse, build and compare the rebuilt bytes with the original
    Roundtrip {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only report mismatches
        #[arg(long)]
        dry_run: bool,
    },
    /// Set one field and write the re-serialized file
    Edit {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Dotted field path, e.g. `version`
        #[arg(value_name = "PATH")]
        path: String,

        /// New value as typed in an editor cell (`0x10`, `aa bb`, `READ | EXEC`, ...)
        #[arg(value_name = "VALUE")]
        value: String,

        /// Output file path (use '-' to print the bytes as hex)
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Write a file built from the demo value of the `sample` format
    Sample {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "fieldlens",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Demo grammar to use (`sample` or `record`)
    #[arg(long, global = true, default_value = "sample")]
    format: String,

    /// Display integers in hexadecimal
    #[arg(long, global = true)]
    hex: bool,

    /// Also show fields whose name is empty or starts with `_`
    #[arg(long, global = true)]
    show_protected: bool,

    /// Log to stderr (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

/// Helper: read bytes from a path, automatically handling `.gz` or gzip header.
fn load_bytes_from_path(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;

    // Detect gzip by extension or by header (0x1f 0x8b)
    let is_gzip = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
        || (data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b);

    if is_gzip {
        let mut decoder = GzDecoder::new(Cursor::new(data));
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("gzip decompression failed")?;
        Ok(out)
    } else {
        Ok(data)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let grammar = formats::by_name(&args.format).with_context(|| {
        format!(
            "unknown format '{}' (expected one of: {})",
            args.format,
            formats::FORMATS.join(", ")
        )
    })?;
    let view = cui::ViewOptions {
        hex: args.hex,
        show_protected: args.show_protected,
    };

    match args.command {
        Commands::Tree { file, all } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::tree::print_tree(&grammar, bytes, &view, all)
        }
        Commands::Chain { file, path } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::chain::print_chain(&grammar, bytes, &view, &path)
        }
        Commands::Roundtrip { file, dry_run } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::roundtrip::test_roundtrip(&file, &grammar, bytes, dry_run)
        }
        Commands::Edit {
            file,
            path,
            value,
            output,
        } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::edit::edit_field(&grammar, bytes, &view, &path, &value, &output)
        }
        Commands::Sample { output } => {
            let bytes = fieldlens::grammar::build_bytes(&formats::sample(), &formats::sample_value())
                .context("failed to build the sample value")?;
            fs::write(&output, &bytes)
                .with_context(|| format!("failed to write file: {}", output.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
            Ok(())
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
