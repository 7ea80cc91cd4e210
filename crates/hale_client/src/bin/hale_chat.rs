//! hale-chat: terminal front-end for the HaleAI session controller.
//! Reads config, shows the disclaimer, then answers questions read line by
//! line from stdin. `/metrics`, `/status` and `/quit` are handled locally.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use hale_client::config;
use hale_client::{Config, Message, MessageStatus, Session, SessionError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DISCLAIMER: &str = "\
Medical Disclaimer
This assistant provides general medical information for educational purposes only.
It is NOT a substitute for professional medical advice, diagnosis, or treatment.
  - Always consult qualified healthcare providers for medical decisions
  - In emergencies, call your local emergency number immediately";

#[derive(Debug, Parser)]
#[command(name = "hale-chat", version, about = "Chat with the HaleAI answer service")]
struct Cli {
    /// Config file (defaults to $HALE_CONFIG, then ~/.hale/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override `server.base_url`.
    #[arg(long)]
    url: Option<String>,
    /// Accept the disclaimer without prompting.
    #[arg(long)]
    yes: bool,
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    // 1. --config <path> flag, 2. HALE_CONFIG env var: must load.
    let explicit = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("HALE_CONFIG").map(PathBuf::from));
    let mut cfg = match explicit {
        Some(path) => config::load(&path)
            .map_err(|e| format!("failed to load config from {}: {}", path.display(), e))?,
        // 3. Default path (~/.hale/config.yaml), optional.
        None => match config::default_config_path() {
            Some(path) => config::load_or_default(&path)
                .map_err(|e| format!("failed to load config from {}: {}", path.display(), e))?,
            None => Config::default(),
        },
    };
    if let Some(url) = &cli.url {
        cfg.server.base_url = Some(url.clone());
    }
    Ok(cfg)
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

fn print_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    writeln!(out, "{}", message.content)?;
    if message.status == MessageStatus::Resolved && !message.sources.is_empty() {
        writeln!(out, "\nSources: {} references", message.sources.len())?;
        for (i, source) in message.sources.iter().enumerate() {
            match &source.page {
                Some(page) => writeln!(out, "  {}. {} (p. {})", i + 1, source.title, page)?,
                None => writeln!(out, "  {}. {}", i + 1, source.title)?,
            }
            if !source.snippet.is_empty() {
                writeln!(out, "     {}", source.snippet)?;
            }
        }
    }
    writeln!(out)
}

async fn print_metrics(out: &mut impl Write, session: &Session) -> io::Result<()> {
    let m = session.metrics();
    writeln!(out, "Performance Metrics")?;
    writeln!(out, "  Total Requests:    {}", m.total_requests)?;
    writeln!(out, "  Avg Response Time: {}ms", m.avg_response_time_ms)?;
    writeln!(out, "  Success Rate:      {}%", m.success_rate)?;
    writeln!(out, "  Uptime:            {}", format_uptime(session.uptime()))?;
    match session.server_resources().await {
        Ok(r) => {
            writeln!(out, "  Server CPU:        {:.1}%", r.cpu_percent)?;
            writeln!(out, "  Server Memory:     {:.1}%", r.memory_percent)?;
        }
        Err(e) => {
            tracing::debug!(error = %e, "server metrics unavailable");
            writeln!(out, "  Server resources:  unavailable")?;
        }
    }
    writeln!(out)
}

fn print_status(out: &mut impl Write, session: &Session) -> io::Result<()> {
    let state = session.connection();
    let label = if state.online { "Online" } else { "Offline" };
    match state.last_probe {
        Some(at) => writeln!(out, "{} (last checked {})", label, at.format("%H:%M:%S")),
        None => writeln!(out, "{} (not checked yet)", label),
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<(), String> {
    let mut session = Session::start(&cfg).map_err(|e| e.to_string())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}\n", DISCLAIMER);
    if !cli.yes {
        println!("Press Enter to acknowledge.");
        if lines.next_line().await.map_err(|e| e.to_string())?.is_none() {
            session.close();
            return Ok(());
        }
    }
    session.dismiss_notice();

    if session.probe().await {
        println!("Connected to {}", cfg.server.base_url());
    } else {
        println!("Service at {} is offline", cfg.server.base_url());
    }

    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        let line = line.trim();
        let mut out = io::stdout();
        let written = match line {
            "" => Ok(()),
            "/quit" => break,
            "/status" => print_status(&mut out, &session),
            "/metrics" => {
                if session.toggle_view() {
                    print_metrics(&mut out, &session).await
                } else {
                    writeln!(out, "Metrics hidden.")
                }
            }
            question => match session.submit_question(question) {
                Ok(submission) => match submission.outcome().await {
                    Some(outcome) => {
                        let latency_ms =
                            u64::try_from(outcome.latency.as_millis()).unwrap_or(u64::MAX);
                        tracing::debug!(latency_ms, "answer received");
                        print_message(&mut out, &outcome.message)
                    }
                    None => break,
                },
                Err(SessionError::Offline) => {
                    writeln!(out, "Service is offline; question not sent.")
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    Ok(())
                }
            },
        };
        written.map_err(|e| e.to_string())?;
        out.flush().map_err(|e| e.to_string())?;
    }

    session.close();
    Ok(())
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    let cli = Cli::parse();
    let cfg = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    if let Err(e) = rt.block_on(run(cli, cfg)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
