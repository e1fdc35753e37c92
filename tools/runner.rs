//! Storyloom runner — generates a complete branching story.
//!
//! Wires the CLI configuration into the expansion engine: resolves the
//! premise (generating one if none is given), validates the fan-out
//! weights before any generation starts, and runs the tree to completion
//! while a background consumer logs progress events.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use storyloom::core::engine::StoryEngine;
use storyloom::core::events::EventSink;
use storyloom::core::generator::{Generator, OpenAiChatClient};
use storyloom::core::premise::{generate_description, generate_metadata};
use storyloom::core::sampler::FanoutWeights;

#[derive(Debug, Parser)]
#[command(name = "storyloom", about = "Generate a branching interactive story")]
struct Args {
    /// Description of the interactive story; generated when omitted.
    #[arg(short, long)]
    description: Option<String>,

    /// Number of scenes on every branch, root to leaf.
    #[arg(short, long, default_value_t = 5)]
    n_scenes: usize,

    /// Branch-count weights as COUNT:WEIGHT pairs, e.g. -l 2:0.3 -l 3:0.2.
    /// The weight of 1 is inferred by subtracting the sum of the others.
    #[arg(short = 'l', long = "leaf-probabilities", value_name = "COUNT:WEIGHT")]
    leaf_probabilities: Vec<String>,

    /// Where the snapshot document is published.
    #[arg(long, default_value = "story_state.json")]
    state_file: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[arg(long, default_value = "http://localhost:11434/v1")]
    base_url: String,

    /// Model for early scenes and metadata generation.
    #[arg(long, default_value = "qwen3:4b")]
    model: String,

    /// Cheaper model for deep scenes and description generation.
    #[arg(long, default_value = "qwen3:1.7b")]
    light_model: String,

    /// Environment variable holding the API key, if the endpoint needs one.
    #[arg(long)]
    api_key_env: Option<String>,

    /// RNG seed for reproducible tree shapes.
    #[arg(long)]
    seed: Option<u64>,

    /// Pause between retries on malformed model output, in milliseconds.
    #[arg(long, default_value_t = 500)]
    retry_pause_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Weight validation is fatal before any generation begins.
    let weights = FanoutWeights::from_specs(&args.leaf_probabilities)?;
    info!(weights = ?weights.entries(), "fan-out weights");

    let api_key = args
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok());

    let mut primary = OpenAiChatClient::new(&args.base_url, &args.model);
    let mut light = OpenAiChatClient::new(&args.base_url, &args.light_model);
    if let Some(ref key) = api_key {
        primary = primary.with_api_key(key.as_str());
        light = light.with_api_key(key.as_str());
    }
    let primary: Arc<dyn Generator> = Arc::new(primary);
    let light: Arc<dyn Generator> = Arc::new(light);
    let retry_pause = Duration::from_millis(args.retry_pause_ms);

    let description = match args.description {
        Some(description) => description,
        None => {
            info!("no description provided, generating one");
            generate_description(light.as_ref())?
        }
    };
    info!(%description, "story description");

    let metadata = generate_metadata(primary.as_ref(), &description, retry_pause)?;
    info!(title = %metadata.title, "story metadata ready");

    let (sink, events) = EventSink::bus(256);
    let watcher = std::thread::spawn(move || {
        for event in events {
            debug!(?event, "story event");
        }
    });

    let mut engine = StoryEngine::builder(metadata)
        .n_scenes(args.n_scenes)
        .weights(weights)
        .state_path(args.state_file)
        .events(sink)
        .generator(primary)
        .light_generator(light)
        .retry_pause(retry_pause);
    if let Some(seed) = args.seed {
        engine = engine.seed(seed);
    }
    let mut engine = engine.build()?;

    engine.run()?;
    drop(engine); // closes the event bus
    let _ = watcher.join();
    Ok(())
}
