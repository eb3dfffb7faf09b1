//! capchat - chat assistant for packet capture statistics

mod capture;
mod commands;
mod config;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use capchat_ai::HttpTransport;
use capchat_session::{ChatEvent, CorrelationId, EventReceiver, EventSink, SessionManager, event_channel};
use clap::Parser;

use capture::{PcapReader, TrafficSummary};
use commands::CommandResult;

/// Events the consumer can fall behind by before sessions wait
const EVENT_QUEUE_CAPACITY: usize = 64;

/// capchat - ask questions about a packet capture
#[derive(Parser, Debug)]
#[command(name = "capchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file (.pcap) whose statistics become the chat context
    #[arg(long)]
    capture: Option<PathBuf>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Model to use (default: deepseek-ai/DeepSeek-V3)
    #[arg(short, long)]
    model: Option<String>,

    /// Chat-completions endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// List the models the endpoint offers and exit
    #[arg(long)]
    list_models: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("capchat=debug")
            .with_writer(io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    let Some(api_key) = cfg.get_api_key() else {
        eprintln!("Error: No API key found");
        eprintln!();
        eprintln!("Set your API key with: export {}=your-key", config::API_KEY_ENV);
        eprintln!("Or add it to config file: capchat --init-config");
        std::process::exit(1);
    };

    // CLI takes precedence over the config file
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| cfg.base_url().to_string());
    let transport = Arc::new(HttpTransport::new(api_key).with_base_url(base_url));

    let mut session_config = cfg.session_config();
    if let Some(model) = args.model {
        session_config.settings.model = model;
    }
    let model = session_config.settings.model.clone();

    if args.list_models {
        let models = transport.list_models().await?;
        print!("{}", commands::list_models_text(&model, &models));
        return Ok(());
    }

    let manager = SessionManager::new(session_config, transport.clone());
    let (sink, events) = event_channel(EVENT_QUEUE_CAPACITY);

    let mut chat = Chat {
        manager,
        transport,
        events,
        sink: Arc::new(sink),
        next_id: 0,
        capture: None,
        model,
    };

    if let Some(ref path) = args.capture {
        let summary = load_capture(path)?;
        println!("{}\n", summary.report());
        chat.capture = Some(summary);
    }

    // Non-interactive mode
    if let Some(command) = args.command {
        return match chat.ask(&command).await {
            Some(ChatEvent::Failed { failure, .. }) => Err(failure.into()),
            _ => Ok(()),
        };
    }

    run_interactive(&mut chat).await
}

/// The single consumer: starts sessions and renders their events
struct Chat {
    manager: SessionManager,
    transport: Arc<HttpTransport>,
    events: EventReceiver,
    sink: Arc<dyn EventSink>,
    next_id: u64,
    capture: Option<TrafficSummary>,
    model: String,
}

impl Chat {
    fn next_correlation_id(&mut self) -> CorrelationId {
        self.next_id += 1;
        CorrelationId::new(self.next_id.to_string())
    }

    /// Ask one question and stream the reply to stdout. Returns the
    /// terminal event, or `None` if the session could not be started.
    async fn ask(&mut self, message: &str) -> Option<ChatEvent> {
        let id = self.next_correlation_id();
        let context = self.capture.as_ref().map(TrafficSummary::report);

        if let Err(e) = self
            .manager
            .start(message, context, id.clone(), Arc::clone(&self.sink))
        {
            eprintln!("Error: {}", e);
            return None;
        }

        let terminal = self.render_until_done(&id).await;
        if let Some(ChatEvent::Failed { ref failure, .. }) = terminal {
            eprintln!("\nError: {}", failure);
        } else {
            println!();
        }
        terminal
    }

    async fn render_until_done(&mut self, id: &CorrelationId) -> Option<ChatEvent> {
        let mut stdout = io::stdout();
        while let Some(event) = self.events.recv().await {
            if event.id() != id {
                tracing::warn!(correlation_id = %event.id(), "Event for a finished exchange, ignoring");
                continue;
            }
            match event {
                ChatEvent::Delta { ref text, .. } => {
                    print!("{}", text);
                    stdout.flush().ok();
                }
                terminal => return Some(terminal),
            }
        }
        None
    }

    async fn list_models(&self) {
        match self.transport.list_models().await {
            Ok(models) => print!("{}", commands::list_models_text(&self.model, &models)),
            Err(e) => println!("Failed to list models: {}", e),
        }
    }
}

fn load_capture(path: &Path) -> anyhow::Result<TrafficSummary> {
    capture::summarize(&PcapReader::new(), path)
        .with_context(|| format!("Failed to load capture {}", path.display()))
}

async fn run_interactive(chat: &mut Chat) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if io::IsTerminal::is_terminal(&io::stderr()) {
        eprintln!("capchat ({})", chat.model);
        if chat.capture.is_none() {
            eprintln!("Load a capture with /load <file>, or just ask. /help lists commands.");
        }
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input) {
            match result {
                CommandResult::Clear => {
                    chat.manager.clear_history();
                    println!("Cleared conversation.");
                }
                CommandResult::Exit => {
                    break;
                }
                CommandResult::Message(msg) => {
                    println!("{}", msg);
                }
                CommandResult::Load(path) => match load_capture(&path) {
                    Ok(summary) => {
                        println!("{}", summary.report());
                        chat.capture = Some(summary);
                    }
                    Err(e) => println!("{:#}", e),
                },
                CommandResult::Stats => match chat.capture {
                    Some(ref summary) => println!("{}", summary.report()),
                    None => println!("No capture loaded. Use /load <file>."),
                },
                CommandResult::Models => {
                    chat.list_models().await;
                }
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        println!();
        chat.ask(input).await;
        println!();
    }

    Ok(())
}
