mod display;

use std::collections::HashSet;
use std::io::{IsTerminal, Write, stdout};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chorus_llm::aggregator::{ChatPrompt, SessionView, StreamAggregator};
use chorus_llm::config::{ProviderConfig, ProviderKind, ProviderOverrides, build_provider};
use chorus_llm::http::DynHttpTransport;
use chorus_llm::http::reqwest::default_dyn_transport;
use chorus_llm::{DynProvider, LLMError};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use crate::display::{LiveRenderer, Tone};

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "chorus", author, version, about, long_about = None)]
#[command(after_help = "Examples:
  chorus models openai                      List OpenAI models using .env
  chorus validate anthropic                 Validate the Anthropic API key
  chorus models gemini -k YOUR_KEY          Use a custom API key
  chorus chat \"Hello\" -p openai -p gemini   Stream from two providers at once")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct KeyArgs {
    /// API key (overrides .env)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Base URL for the API (overrides .env)
    #[arg(short = 'b', long)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models visible to a provider's API key
    Models {
        #[arg(value_enum)]
        provider: ProviderKind,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Check a provider's API key by listing its models
    Validate {
        #[arg(value_enum)]
        provider: ProviderKind,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Send one message to several providers and stream the answers side by side
    Chat {
        /// The message to send
        message: String,

        /// Provider to ask, repeatable; defaults to every provider with a key
        #[arg(short = 'p', long = "provider", value_enum)]
        providers: Vec<ProviderKind>,

        /// Model used by every provider instead of its default
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt (overrides CHORUS_SYSTEM_PROMPT)
        #[arg(short, long = "system")]
        system_prompt: Option<String>,

        /// Cancel providers still streaming after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chorus={level},chorus_llm={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the environment may already carry the keys.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if !stdout().is_terminal() {
        colored::control::set_override(false);
    }

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            let body = format!("{err:#}");
            eprintln!("{}", display::panel("Error", &body, Tone::Failure));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    let transport = default_dyn_transport().context("failed to initialise HTTP client")?;
    match command {
        Commands::Models { provider, key } => list_models(provider, key, transport).await,
        Commands::Validate { provider, key } => validate(provider, key, transport).await,
        Commands::Chat {
            message,
            providers,
            model,
            system_prompt,
            timeout,
        } => {
            let mut prompt = ChatPrompt::new(message);
            prompt.model = model;
            prompt.system_prompt = system_prompt;
            chat(providers, prompt, timeout, transport).await
        }
    }
}

fn configuration_error(err: &LLMError) -> ExitCode {
    let body = err.to_string();
    eprintln!("{}", display::panel("Configuration Error", &body, Tone::Failure));
    ExitCode::FAILURE
}

fn resolve(
    kind: ProviderKind,
    key: KeyArgs,
    transport: DynHttpTransport,
) -> Result<(ProviderConfig, DynProvider), LLMError> {
    let overrides = ProviderOverrides {
        api_key: key.api_key,
        base_url: key.base_url,
        ..Default::default()
    };
    let config = ProviderConfig::from_env(kind, overrides)?;
    let provider = build_provider(&config, transport)?;
    Ok((config, provider))
}

async fn list_models(
    kind: ProviderKind,
    key: KeyArgs,
    transport: DynHttpTransport,
) -> Result<ExitCode> {
    let (config, provider) = match resolve(kind, key, transport) {
        Ok(resolved) => resolved,
        Err(err) => return Ok(configuration_error(&err)),
    };
    println!(
        "{}\n",
        display::provider_info(provider.name(), &config.api_key, config.base_url.as_deref())
    );

    match provider.list_models().await {
        Ok(models) => {
            println!("{}", display::models_table(provider.name(), &models));
            println!("\n{}", format!("Total: {} models", models.len()).as_str().green().bold());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!(
                "{}",
                display::panel(
                    "Error",
                    &format!("Error fetching models from {}:\n{err}", provider.name()),
                    Tone::Failure,
                )
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn validate(
    kind: ProviderKind,
    key: KeyArgs,
    transport: DynHttpTransport,
) -> Result<ExitCode> {
    let (config, provider) = match resolve(kind, key, transport) {
        Ok(resolved) => resolved,
        Err(err) => return Ok(configuration_error(&err)),
    };
    println!(
        "{}\n",
        display::provider_info(provider.name(), &config.api_key, config.base_url.as_deref())
    );
    println!("Validating {} API key...", provider.name());

    let title = format!("{} Key Validation", provider.name());
    if provider.validate_key().await {
        println!("{}", display::panel(&title, "API key is valid!", Tone::Success));
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", display::panel(&title, "API key is invalid!", Tone::Failure));
        Ok(ExitCode::FAILURE)
    }
}

async fn chat(
    requested: Vec<ProviderKind>,
    prompt: ChatPrompt,
    timeout: Option<u64>,
    transport: DynHttpTransport,
) -> Result<ExitCode> {
    let explicit = !requested.is_empty();
    let mut kinds = if explicit {
        requested
    } else {
        ProviderKind::ALL.to_vec()
    };
    let mut seen = HashSet::new();
    kinds.retain(|kind| seen.insert(*kind));

    let mut providers = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match ProviderConfig::from_env(kind, ProviderOverrides::default())
            .and_then(|config| build_provider(&config, transport.clone()))
        {
            Ok(provider) => providers.push(provider),
            Err(err) if explicit => return Ok(configuration_error(&err)),
            Err(err) => tracing::warn!(provider = %kind, error = %err, "provider skipped"),
        }
    }

    let session = match StreamAggregator::new().start(providers, prompt) {
        Ok(session) => session,
        Err(err) => return Ok(configuration_error(&err)),
    };

    let cancel = session.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling remaining providers");
                cancel.cancel();
            }
        }
    });
    if let Some(secs) = timeout {
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                if !cancel.is_cancelled() {
                    tracing::warn!(secs, "timeout reached, cancelling remaining providers");
                    cancel.cancel();
                }
            }
        });
    }

    let redraw = stdout()
        .is_terminal()
        .then(|| tokio::spawn(live_redraw(session.view())));

    let snapshot = session.await_all().await;
    match redraw {
        // the redraw loop exits after drawing the final frame
        Some(handle) => handle.await.context("redraw task failed")??,
        None => {
            let mut out = stdout().lock();
            writeln!(out, "{}", display::render_session(&snapshot))?;
        }
    }

    if snapshot.iter().all(|provider| provider.has_error()) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn live_redraw(view: SessionView) -> std::io::Result<()> {
    let mut renderer = LiveRenderer::default();
    let mut ticker = tokio::time::interval(REDRAW_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut drawn = None;
    loop {
        ticker.tick().await;
        let revision = view.revision();
        if drawn == Some(revision) {
            continue;
        }
        let snapshot = view.snapshot();
        renderer.draw(&mut stdout().lock(), &display::render_session(&snapshot))?;
        drawn = Some(revision);
        if snapshot.all_done() {
            tracing::debug!(frames = renderer.frames(), "live view finished");
            return Ok(());
        }
    }
}
