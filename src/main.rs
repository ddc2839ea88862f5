use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pagefind_runtime::cache::{ArtifactKind, ArtifactRef};
use pagefind_runtime::codec::{self, inflate};
use pagefind_runtime::doctor;
use pagefind_runtime::fragment::Fragment;

/// Inspect and debug Pagefind search indexes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that an index loads: manifest, version, language and artifacts
    Doctor {
        /// Index directory or URL
        #[arg(long, env = "PAGEFIND_BASE_PATH")]
        base_path: String,
        /// Language to resolve (defaults to the largest index)
        #[arg(long, env = "PAGEFIND_LANGUAGE")]
        language: Option<String>,
    },
    /// Decompress a single artifact file
    Decompress {
        file: PathBuf,
        /// Write the payload here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Treat the file as a bare DEFLATE stream without a signature
        #[arg(long)]
        raw: bool,
    },
    /// Fetch a content fragment and print a summary of it
    Fragment {
        /// Index directory or URL
        #[arg(long, env = "PAGEFIND_BASE_PATH")]
        base_path: String,
        /// Fragment hash, as found in search results
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so decompressed payloads can be piped from stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    handle_command(args.command).await
}

async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Doctor {
            base_path,
            language,
        } => run_doctor(&base_path, language.as_deref()).await,
        Commands::Decompress { file, output, raw } => decompress_file(file, output, raw).await,
        Commands::Fragment { base_path, hash } => show_fragment(&base_path, &hash).await,
    }
}

async fn run_doctor(base_path: &str, language: Option<&str>) -> Result<()> {
    let loader = doctor::loader_for(base_path)?;
    let results = doctor::run_diagnostics(&loader, language).await?;
    doctor::print_results(loader.base_path(), &results);

    if doctor::has_critical_failures(&results) {
        process::exit(1);
    }
    Ok(())
}

async fn decompress_file(file: PathBuf, output: Option<PathBuf>, raw: bool) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let label = file.display().to_string();

    let payload = if raw {
        inflate::inflate(&data, None)
            .with_context(|| format!("Failed to inflate {label}"))?
    } else {
        match codec::check_artifact(&data, &label) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("{}; writing best-effort output", e);
                codec::decompress(&data, &label)
            }
        }
    };
    tracing::info!(
        "Decompressed {} bytes into {} bytes",
        data.len(),
        payload.len()
    );

    match output {
        Some(path) => tokio::fs::write(&path, &payload)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => std::io::stdout()
            .write_all(&payload)
            .context("Failed to write to stdout"),
    }
}

async fn show_fragment(base_path: &str, hash: &str) -> Result<()> {
    let loader = doctor::loader_for(base_path)?;
    let artifact = ArtifactRef::new(ArtifactKind::Fragment, hash)?;
    let bytes = loader.load(&artifact).await?;
    let fragment = Fragment::from_bytes(hash, &bytes)?;

    println!("Title:      {}", fragment.title());
    println!("URL:        {}", fragment.url);
    println!("Word count: {}", fragment.word_count);
    for (name, values) in &fragment.filters {
        println!("Filter:     {} = {}", name, values.join(", "));
    }

    let headings: Vec<_> = fragment
        .anchors
        .iter()
        .filter(|a| a.is_section_heading())
        .collect();
    println!("Headings:   {}", headings.len());
    for anchor in headings {
        println!(
            "  {:>6}  {:<4} #{:<24} {}",
            anchor.location, anchor.element, anchor.id, anchor.text
        );
    }
    Ok(())
}
