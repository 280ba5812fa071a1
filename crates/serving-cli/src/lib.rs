//! # serving-cli
//!
//! Command-line caller for the serving engine.
//!
//! Wires: model directory → [`GenerationEngine`] → blocking output or a
//! [`ResultIterator`] drained token by token. Token ids go in and come out as
//! comma-separated lists (`15,290,42`).

use std::io::Write;

use serving_engine::{GenerationConfig, ServingError, TokenId};
use serving_runtime::{GenerationEngine, ResultIterator};

/// Errors from the command-line pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Serving(#[from] ServingError),
    #[error("invalid token list: {0}")]
    InvalidTokens(String),
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// One generation request as given on the command line.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub model: String,
    pub tokens: Vec<TokenId>,
    pub generation: GenerationConfig,
    pub stream: bool,
}

/// Parse `15,290,42` into token ids. Whitespace around ids is ignored.
pub fn parse_tokens(raw: &str) -> Result<Vec<TokenId>, CliError> {
    if raw.trim().is_empty() {
        return Err(CliError::InvalidTokens("no tokens given".into()));
    }
    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<TokenId>()
                .map_err(|e| CliError::InvalidTokens(format!("{part:?}: {e}")))
        })
        .collect()
}

fn join_tokens(tokens: &[TokenId]) -> String {
    tokens
        .iter()
        .map(TokenId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Run one request and write the output sequences, one per line.
///
/// Streaming writes each token as soon as it is pulled. Returns the sequences
/// that were written.
pub fn run_generate<W: Write>(
    engine: &GenerationEngine,
    args: &GenerateArgs,
    out: &mut W,
) -> Result<Vec<Vec<TokenId>>, CliError> {
    let config = args.generation.sampling_config();

    if !args.stream {
        let output = engine.generate(&args.model, &args.tokens, config)?;
        for sequence in &output.sequences {
            writeln!(out, "{}", join_tokens(sequence))?;
        }
        tracing::debug!(
            finish_reason = %output.finish_reason,
            ttft_ms = output.metrics.ttft_ms,
            "generation complete"
        );
        return Ok(output.sequences);
    }

    let session = engine.generate_streaming(&args.model, &args.tokens, config)?;
    let mut tokens = Vec::new();
    for token in ResultIterator::new(session) {
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                if !tokens.is_empty() {
                    writeln!(out)?;
                }
                return Err(e.into());
            }
        };
        if !tokens.is_empty() {
            write!(out, ",")?;
        }
        write!(out, "{token}")?;
        out.flush()?;
        tokens.push(token);
    }
    writeln!(out)?;
    Ok(vec![tokens])
}

/// Write one line per loaded model.
pub fn run_models<W: Write>(engine: &GenerationEngine, out: &mut W) -> Result<(), CliError> {
    for name in engine.model_names() {
        let Some(spec) = engine.model_spec(&name) else {
            continue;
        };
        writeln!(
            out,
            "{name}\tvocab={}\teos={}\tmax_seq_len={}\tmax_new_tokens={}",
            spec.vocab_size, spec.eos_token_id, spec.max_seq_len, spec.max_new_tokens
        )?;
    }
    Ok(())
}
