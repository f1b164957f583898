use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

mod client;
mod config;
mod models;
mod proxy;
mod render;
mod server;
mod session;
mod storage;
mod transport;

use client::{ChatClient, IgnoreReason, SendOutcome};
use config::{ProxyConfig, ProxyOverrides};
use session::Role;
use storage::{ClientStorage, MemoryStorage, SqliteStorage};
use transport::HttpTransport;

const SUGGESTIONS: [&str; 2] = [
    "Give me a summary of the portfolio owner's experience",
    "Tell me about the most important projects",
];

#[derive(Debug, Parser)]
#[command(name = "portfolio_chat")]
#[command(about = "Portfolio chat proxy and terminal chat client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the chat proxy in front of the upstream LLM API.
    Serve {
        /// Overrides PORT (which binds 0.0.0.0).
        #[arg(long)]
        listen: Option<SocketAddr>,
        #[arg(long)]
        upstream_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Expose Prometheus metrics on this address.
        #[arg(long)]
        metrics_listen: Option<SocketAddr>,
    },
    /// Chat with the proxy from the terminal.
    Chat {
        #[arg(long, env = "CHAT_ENDPOINT", default_value = "http://127.0.0.1:5000/api")]
        endpoint: String,
        /// SQLite file for saved chats; defaults under $XDG_DATA_HOME.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Keep chats in memory only.
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { listen, upstream_url, model, timeout_secs, metrics_listen } => {
            let overrides = ProxyOverrides { listen, upstream_url, model, timeout_secs };
            let cfg = ProxyConfig::from_env(&overrides)?;
            if cfg.api_key.is_none() {
                tracing::warn!("GROQ_API_KEY is not set; every chat request will fail");
            }
            if let Some(addr) = metrics_listen {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()?;
                tracing::info!(%addr, "metrics exporter listening");
            }
            let model = models::GroqChat::from_config(&cfg)?;
            let state = server::AppState::new(Arc::new(model));
            server::serve(cfg.listen, state).await?;
        }
        Commands::Chat { endpoint, db, ephemeral } => {
            let storage: Arc<dyn ClientStorage> = if ephemeral {
                Arc::new(MemoryStorage::new())
            } else {
                Arc::new(SqliteStorage::open(db).await?)
            };
            let transport = HttpTransport::new(endpoint, transport::DEFAULT_CLIENT_TIMEOUT)?;
            let client = ChatClient::load(storage, Arc::new(transport)).await;
            run_chat(&client).await?;
        }
    }
    Ok(())
}

async fn run_chat(client: &ChatClient) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", "Type a question, or /help for commands.".dimmed());
    print_history(client).await;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim()));
        match cmd {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => println!("/new  /list  /switch <n>  /delete [n]  /history  /suggest [n]  /quit"),
            "/new" => {
                client.create_session().await;
                print_history(client).await;
            }
            "/list" => {
                let state = client.snapshot().await;
                for (i, s) in state.sessions().iter().enumerate() {
                    let marker = if s.id == state.active_id() { "*" } else { " " };
                    println!("{marker} {i}: {}", s.title);
                }
            }
            "/switch" => match session_at(client, arg).await {
                Some(id) if client.select_session(&id).await => print_history(client).await,
                _ => println!("no such chat: {arg}"),
            },
            "/delete" => {
                let target = if arg.is_empty() {
                    Some(client.snapshot().await.active_id().to_owned())
                } else {
                    session_at(client, arg).await
                };
                match target {
                    Some(id) if client.delete_session(&id).await => println!("deleted"),
                    _ => println!("no such chat: {arg}"),
                }
            }
            "/history" => print_history(client).await,
            "/suggest" => match arg.parse::<usize>().ok().and_then(|i| SUGGESTIONS.get(i)) {
                Some(q) => send(client, &mut stdout, q).await?,
                None => {
                    for (i, q) in SUGGESTIONS.iter().enumerate() {
                        println!("{i}: {q}");
                    }
                }
            },
            _ => send(client, &mut stdout, line).await?,
        }
    }
    client.save().await
}

async fn session_at(client: &ChatClient, arg: &str) -> Option<String> {
    let idx: usize = arg.parse().ok()?;
    client.snapshot().await.sessions().get(idx).map(|s| s.id.clone())
}

async fn send(client: &ChatClient, out: &mut tokio::io::Stdout, text: &str) -> anyhow::Result<()> {
    match client.send_message(text).await {
        SendOutcome::Answered(reply) => {
            render::type_out(out, &render::format_content(&reply.content), render::TYPE_INTERVAL).await?;
        }
        SendOutcome::Failed { reply, notice } => {
            eprintln!("{}", notice.yellow());
            println!("{}", reply.content);
        }
        SendOutcome::Ignored(IgnoreReason::SendInFlight) => println!("{}", "still waiting for the last answer".dimmed()),
        SendOutcome::Ignored(_) => {}
    }
    Ok(())
}

async fn print_history(client: &ChatClient) {
    let state = client.snapshot().await;
    let Some(session) = state.active() else { return };
    println!("{}", format!("== {} ==", session.title).bold());
    for m in &session.messages {
        match m.role {
            Role::User => println!("{} {}", "you>".green(), m.content),
            Role::Assistant => println!("{}", render::format_content(&m.content)),
        }
    }
}
