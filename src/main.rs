//! Docsort CLI
//!
//! Scans a source tree, asks an OpenAI-compatible model server to classify
//! and rename each document, and moves it into the destination tree.

use anyhow::Context;
use clap::Parser;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docsort_lib::{
    shutdown_channel, Args, CategorizationEngine, CategoryRegistry, Config, ContextManager,
    OpenAiCompatClient, Pipeline, ShutdownHandle, Tokenizer,
};

const DEFAULT_LOG_FILTER: &str = "warn,docsort_lib=info,docsort=info";
const VERBOSE_LOG_FILTER: &str = "warn,docsort_lib=debug,docsort=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args).context("Failed to load configuration")?;

    println!("=== Docsort ===");
    println!("Source:      {}", config.src.display());
    println!("Destination: {}", config.dst.display());
    println!("API URL:     {}", config.api);
    println!("Model:       {}", config.model);
    println!("Workers:     {}", config.workers);
    println!("-----------------------------------------");

    let tokenizer = Tokenizer::for_encoding(&config.encoding).context("Failed to initialize tokenizer")?;
    let context = ContextManager::new(Arc::new(tokenizer), config.ctx);
    let backend = Arc::new(OpenAiCompatClient::new(&config.api, config.request_timeout));
    info!(endpoint = backend.endpoint(), "Classification backend ready");

    let registry = Arc::new(CategoryRegistry::default());
    let engine = Arc::new(CategorizationEngine::new(backend, context, registry, config.model.clone()));
    let pipeline = Pipeline::new(config.pipeline_config(), engine);

    let (handle, signal) = shutdown_channel();
    tokio::spawn(forward_signals(handle));

    let summary = pipeline.run(signal.clone()).await.context("Pipeline failed")?;

    println!("-----------------------------------------");
    print!("{}", summary);
    if signal.is_cancelled() {
        println!("[!] Pipeline stopped by user.");
    }
    let elapsed = summary.elapsed().to_std().unwrap_or_default();
    println!("[+] Processing complete in {:.1?}", elapsed);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Trigger shutdown on Ctrl-C or SIGTERM
async fn forward_signals(handle: ShutdownHandle) {
    handle.trigger_on(wait_for_signal()).await;
}

/// Resolves on the first signal. Errors only when no listener could be installed.
#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            return tokio::signal::ctrl_c().await;
        }
    };
    let ctrl_c = tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => return Ok(()),
    };
    if let Err(e) = ctrl_c {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        terminate.recv().await;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
