use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use distill_core::{Complexity, ConfigPaths, Distiller, ModelManager, StreamEvent, Transformation};
use owo_colors::OwoColorize;

mod echo;
use echo::{print_banner, print_info, print_step, print_success};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Distill a web page or PDF into a simplified document via an LLM backend
#[derive(Parser, Debug)]
#[command(name = "distill")]
#[command(author = "Distill Contributors")]
#[command(version)]
#[command(about = "Distill web pages and PDFs into simplified documents", long_about = None)]
struct Args {
    /// URL to distill (HTML page or PDF)
    #[arg(value_name = "URL", required_unless_present = "models")]
    url: Option<String>,

    /// Target audience complexity (beginner, intermediate)
    #[arg(short, long, default_value = "beginner", value_name = "LEVEL")]
    complexity: ComplexityArg,

    /// Wait for the full result instead of streaming tokens
    #[arg(long)]
    no_stream: bool,

    /// Only extract and print the readable content, skipping transformation
    #[arg(long)]
    extract_only: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Base directory containing config/ and prompts/
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// List model backends and their key/enabled status
    #[arg(long)]
    models: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Newtype so clap error messages list the valid levels.
#[derive(Debug, Clone, Copy)]
struct ComplexityArg(Complexity);

impl FromStr for ComplexityArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Complexity::from_str(s).map(ComplexityArg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        print_banner();
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("distill_core=debug")),
            )
            .with_writer(io::stderr)
            .init();
        print_info("Debug logging enabled");
        eprintln!();
    }

    let paths = args.config_dir.as_ref().map(ConfigPaths::under).unwrap_or_default();

    if args.models {
        return list_models(&paths);
    }

    let url = args.url.as_deref().context("URL is required")?;
    let distiller = Distiller::with_paths(paths).context("Failed to initialize pipeline")?;

    if args.extract_only {
        return extract_only(&distiller, url, args.verbose, args.output).await;
    }

    let transformation = if args.no_stream {
        run_blocking(&distiller, url, args.complexity.0, args.verbose).await?
    } else {
        run_streaming(&distiller, url, args.complexity.0, args.verbose, args.output.is_none()).await?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, &transformation.result)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            if args.no_stream {
                println!("{}", transformation.result);
            }
            // In streaming mode the chunks were already printed as they arrived.
        }
    }

    if args.verbose {
        eprintln!();
        eprintln!("  {} {}", "Title:".dimmed(), transformation.title.bright_white());
        eprintln!("  {} {}", "Model:".dimmed(), transformation.model.bright_white());
        eprintln!(
            "  {} {} → {}",
            "Length:".dimmed(),
            transformation.original_length.to_string().bright_white(),
            transformation.transformed_length.to_string().bright_white()
        );
        if transformation.image_count > 0 {
            eprintln!(
                "  {} {}",
                "Images:".dimmed(),
                transformation.image_count.to_string().bright_white()
            );
        }
    }

    Ok(())
}

async fn run_blocking(
    distiller: &Distiller, url: &str, complexity: Complexity, verbose: bool,
) -> anyhow::Result<Transformation> {
    if verbose {
        print_step(1, 2, &format!("Processing {}", url.bright_white().underline()));
    }
    let transformation = distiller.distill(url, complexity).await?;
    if verbose {
        print_step(2, 2, "Transformation complete");
    }
    Ok(transformation)
}

async fn run_streaming(
    distiller: &Distiller, url: &str, complexity: Complexity, verbose: bool, print_chunks: bool,
) -> anyhow::Result<Transformation> {
    let mut stdout = io::stdout();
    let transformation = distiller
        .distill_stream(url, complexity, |event| match event {
            StreamEvent::Init { message } | StreamEvent::Progress { message, .. } => {
                if verbose {
                    eprintln!("{} {}", "·".dimmed(), message.bright_cyan());
                }
            }
            StreamEvent::ContentChunk { chunk } => {
                if print_chunks {
                    print!("{}", chunk);
                    let _ = stdout.flush();
                }
            }
            StreamEvent::Complete { .. } => {}
            StreamEvent::Error { .. } => {
                // The returned error carries the same message.
            }
        })
        .await?;

    if print_chunks {
        println!();
    }
    Ok(transformation)
}

async fn extract_only(
    distiller: &Distiller, url: &str, verbose: bool, output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if verbose {
        print_step(1, 1, &format!("Extracting {}", url.bright_white().underline()));
    }
    let extracted = distiller.extract(url).await?;

    if verbose {
        eprintln!("  {} {}", "Title:".dimmed(), extracted.title.bright_white());
        eprintln!(
            "  {} {}",
            "Length:".dimmed(),
            extracted.content_chars().to_string().bright_white()
        );
        eprintln!(
            "  {} {}",
            "Images:".dimmed(),
            extracted.image_count.to_string().bright_white()
        );
        eprintln!();
    }

    match output {
        Some(path) => {
            fs::write(&path, &extracted.content)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => println!("{}", extracted.content),
    }
    Ok(())
}

fn list_models(paths: &ConfigPaths) -> anyhow::Result<()> {
    let manager = ModelManager::new(paths).context("Failed to initialize model manager")?;

    eprintln!("{}", "Model backends".bold());
    for status in manager.available_models() {
        let marker = if status.is_current {
            "●".green().to_string()
        } else if status.has_valid_key && status.is_enabled {
            "○".cyan().to_string()
        } else {
            "○".dimmed().to_string()
        };

        let mut notes = Vec::new();
        if !status.has_valid_key {
            notes.push("no key".to_string());
        }
        if !status.is_enabled {
            notes.push("disabled".to_string());
        }
        if status.is_selected {
            notes.push("selected".to_string());
        }
        if status.is_current {
            notes.push("current".to_string());
        }
        let notes =
            if notes.is_empty() { String::new() } else { format!(" ({})", notes.join(", ")).dimmed().to_string() };

        println!("{} {} {} {}{}", marker, status.id.bright_white(), "→".dimmed(), status.model, notes);
    }
    Ok(())
}
