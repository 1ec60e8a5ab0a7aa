//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use savol_core::domain::{PipelineEvent, SessionId, TargetId};
use savol_core::impls::{EchoBackend, InMemoryHistory, OpenAiBackend, TavilyBackend};
use savol_core::ports::{ChannelEventSink, ChatMessage, CompletionBackend, DeliverySink};
use savol_core::{Job, Pipeline, PipelineBuilder, PipelineConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// savol: question answering over a language model and live web search.
#[derive(Parser)]
#[command(name = "savol", version, long_about = None)]
pub(crate) struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, env = "SAVOL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a single question and exit.
    Ask {
        question: String,

        /// Answer only from allowlisted official sources, with citations.
        #[arg(long)]
        cited: bool,

        /// Ground the answer in web search even if it does not look time-sensitive.
        #[arg(long)]
        search: bool,
    },

    /// Read questions from stdin, one per line. Answers print as they finish.
    ///
    /// Lines starting with `/` are commands: /reset, /stats, /quit.
    Chat {
        /// Conversation id used for history.
        #[arg(long, default_value = "local")]
        session: String,

        /// Treat every question as citation-required.
        #[arg(long)]
        cited: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "savol=info,savol_core=info",
        1 => "savol=debug,savol_core=debug",
        _ => "savol=trace,savol_core=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // logs go to stderr; stdout carries answers only
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Ask {
            question,
            cited,
            search,
        } => ask(config, question, cited, search).await,
        Command::Chat { session, cited } => chat(config, session, cited).await,
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn ask(config: PipelineConfig, question: String, cited: bool, search: bool) -> Result<()> {
    let app = App::start(config)?;

    let mut job = Job::new("cli", "cli/1", question.clone());
    if cited {
        job = job.with_citations();
    }
    if search {
        job = job.with_required_search();
    }
    app.delivery.expect_answer(&job.target_id, &job.session_id, &question);
    let lang = job.lang;
    let receipt = app.pipeline.submit(job).await?;
    eprintln!("{}", receipt.ack.message(lang));

    app.pipeline.wait_idle().await;
    app.stop().await;
    Ok(())
}

async fn chat(config: PipelineConfig, session: String, cited: bool) -> Result<()> {
    let app = App::start(config)?;
    let session_id = SessionId::new(&session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seq = 0u64;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; finishing queued questions");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                app.history.reset(&session_id);
                eprintln!("history cleared");
                continue;
            }
            "/stats" => {
                let stats = app.pipeline.stats().await;
                eprintln!("{stats:?}");
                continue;
            }
            _ => {}
        }

        seq += 1;
        let mut job = Job::new(session.clone(), format!("{session}/{seq}"), line);
        if cited {
            job = job.with_citations();
        }
        app.delivery.expect_answer(&job.target_id, &job.session_id, line);
        let lang = job.lang;
        let receipt = app.pipeline.submit(job).await?;
        eprintln!("[{seq}] {}", receipt.ack.message(lang));
    }

    app.pipeline.wait_idle().await;
    app.stop().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct App {
    pipeline: Pipeline,
    history: Arc<InMemoryHistory>,
    delivery: Arc<StdoutDelivery>,
    events: JoinHandle<()>,
}

impl App {
    fn start(config: PipelineConfig) -> Result<Self> {
        let completion: Arc<dyn CompletionBackend> = match OpenAiBackend::from_config(&config.openai) {
            Some(backend) => Arc::new(backend?),
            None => {
                warn!(
                    env = %config.openai.api_key_env,
                    "model API key not set; answering with the echo backend"
                );
                Arc::new(EchoBackend)
            }
        };
        let search = TavilyBackend::from_config(&config.tavily).transpose()?;

        let history = Arc::new(InMemoryHistory::default());
        let delivery = Arc::new(StdoutDelivery::new(Arc::clone(&history)));
        let (events, rx) = ChannelEventSink::new();

        let mut builder = PipelineBuilder::new(config)
            .completion(completion)
            .delivery(delivery.clone())
            .history(history.clone())
            .events(Arc::new(events));
        match search {
            Some(search) => builder = builder.search(Arc::new(search)),
            None => info!("search API key not set; answering without web search"),
        }
        let pipeline = builder.build()?;

        Ok(Self {
            pipeline,
            history,
            delivery,
            events: tokio::spawn(log_events(rx)),
        })
    }

    async fn stop(self) {
        self.pipeline.shutdown().await;
        // every sender is gone with the pipeline; the logger drains and exits
        if let Err(err) = self.events.await {
            warn!(error = %err, "event logger ended abnormally");
        }
    }
}

async fn log_events(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            PipelineEvent::SearchDegraded { job } => {
                info!(%job, "search unavailable, answered without it")
            }
            PipelineEvent::JobFinished {
                job,
                state,
                elapsed,
                chars,
            } => debug!(%job, ?state, ?elapsed, chars, "finished"),
            other => debug!(event = ?other, "pipeline event"),
        }
    }
}

/// Prints answers and records each finished exchange in the history.
struct StdoutDelivery {
    history: Arc<InMemoryHistory>,
    pending: Mutex<HashMap<TargetId, (SessionId, String)>>,
}

impl StdoutDelivery {
    fn new(history: Arc<InMemoryHistory>) -> Self {
        Self {
            history,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn expect_answer(&self, target: &TargetId, session: &SessionId, question: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(target.clone(), (session.clone(), question.to_string()));
    }
}

#[async_trait]
impl DeliverySink for StdoutDelivery {
    async fn deliver(&self, target: &TargetId, text: &str) {
        let exchange = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(target);
        if let Some((session, question)) = exchange {
            self.history.append(&session, ChatMessage::user(question));
            self.history.append(&session, ChatMessage::assistant(text));
        }

        let mut out = tokio::io::stdout();
        let rendered = format!("── {target}\n{text}\n\n");
        if let Err(err) = out.write_all(rendered.as_bytes()).await {
            warn!(error = %err, "cannot write answer to stdout");
        }
        let _ = out.flush().await;
    }
}
