use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use deutsch_tutor_runner::config::{BackendConfig, Transport, DEFAULT_MODEL, DEFAULT_OLLAMA_HOST};
use deutsch_tutor_runner::server::AppState;
use deutsch_tutor_runner::session::Session;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "deutsch_tutor", about = "German conversation partner backed by a local Ollama model")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Ollama model identifier.
    #[arg(long, global = true, env = "DEUTSCH_TUTOR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, global = true, env = "OLLAMA_HOST", default_value = DEFAULT_OLLAMA_HOST)]
    ollama_host: String,
    #[arg(long, global = true, env = "DEUTSCH_TUTOR_TRANSPORT", value_enum, default_value_t = Transport::Http)]
    transport: Transport,
    /// Upper bound on one model call, in seconds.
    #[arg(long, global = true, env = "DEUTSCH_TUTOR_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

impl From<BackendArgs> for BackendConfig {
    fn from(a: BackendArgs) -> Self {
        BackendConfig {
            model: a.model,
            ollama_host: a.ollama_host,
            transport: a.transport,
            timeout: a.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Interactive chat on stdin/stdout.
    Chat,
    /// One exchange against an empty conversation; prints the turn as JSON.
    Ask {
        #[arg(long)]
        message: String,
    },
    /// HTTP JSON API with one conversation per session id.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Sessions idle for longer than this many seconds are dropped.
        #[arg(long, env = "DEUTSCH_TUTOR_SESSION_IDLE_SECS", default_value_t = 3600)]
        session_idle_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BackendConfig::from(cli.backend);
    let backend = match config.build_backend() {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to set up model backend");
            std::process::exit(1);
        }
    };

    match cli.cmd {
        Cmd::Chat => {
            let mut session = Session::new();
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) =
                deutsch_tutor_runner::chat::run_chat(&mut session, &backend, input, tokio::io::stdout()).await
            {
                error!(error = %e, "chat terminated");
                std::process::exit(1);
            }
        }
        Cmd::Ask { message } => {
            let mut session = Session::new();
            match session.send(&backend, &message).await {
                Ok(turn) => match serde_json::to_string_pretty(&turn) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        error!(error = %e, "encode error");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
            }
        }
        Cmd::Serve {
            port,
            host,
            session_idle_secs,
        } => {
            let ip: IpAddr = host
                .parse()
                .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
            let addr = SocketAddr::new(ip, port);
            let state = AppState::with_idle_ttl(backend, Duration::from_secs(session_idle_secs));
            if let Err(e) = deutsch_tutor_runner::server::serve(addr, state).await {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
    }
}
