use std::path::PathBuf;

use clap::Parser;
use serving_cli::{parse_tokens, run_generate, run_models, CliError, GenerateArgs};
use serving_engine::GenerationConfig;
use serving_runtime::GenerationEngine;
use tracing_subscriber::EnvFilter;

/// serving-cli: run generation requests against a model directory
#[derive(Parser)]
#[command(name = "serving-cli", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Generate tokens from a prompt.
    Generate {
        /// Directory with one subdirectory per model.
        #[arg(long)]
        model_dir: PathBuf,

        /// Model name.
        #[arg(short, long)]
        model: String,

        /// Prompt token ids, comma-separated (e.g. 15,290,42).
        #[arg(short, long)]
        tokens: String,

        /// Print tokens as they are generated.
        #[arg(long)]
        stream: bool,

        /// Beam width (1 disables beam search).
        #[arg(long, default_value_t = 1)]
        num_beams: u32,

        /// Keep only the k most likely tokens (0 disables).
        #[arg(long, default_value_t = 0)]
        top_k: u32,

        /// Nucleus sampling threshold in (0, 1].
        #[arg(long, default_value_t = 1.0)]
        top_p: f32,

        /// Sampling temperature (must be > 0).
        #[arg(long, default_value_t = 1.0)]
        temperature: f32,
    },

    /// List the models in a model directory.
    Models {
        #[arg(long)]
        model_dir: PathBuf,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::Generate {
            model_dir,
            model,
            tokens,
            stream,
            num_beams,
            top_k,
            top_p,
            temperature,
        } => {
            let args = GenerateArgs {
                model,
                tokens: parse_tokens(&tokens)?,
                generation: GenerationConfig {
                    num_beams,
                    top_k,
                    top_p,
                    temperature,
                },
                stream,
            };
            let engine = GenerationEngine::init(&model_dir)?;
            run_generate(&engine, &args, &mut stdout)?;
        }
        Command::Models { model_dir } => {
            let engine = GenerationEngine::init(&model_dir)?;
            run_models(&engine, &mut stdout)?;
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
