//! Voice call client entry point
//!
//! Joins a signaling room and holds a two-party audio call until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Call into the default room as the offering side
//! cargo run -p voicelink-call -- --role caller
//!
//! # Answer calls on a custom rendezvous server
//! cargo run -p voicelink-call -- \
//!   --role callee \
//!   --signaling-url wss://rooms.example.org/vc
//!
//! # Load a YAML config and log as JSON
//! cargo run -p voicelink-call -- --config ./call.yaml --log-json
//! ```
//!
//! While running, type `r` to reconnect, `s` to stop, or `q` to quit.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voicelink_webrtc::{
    CallConfig, CallHandle, CallRole, Coordinator, HeadlessMediaEndpoint, RtcPeerEngineFactory,
    TurnServerConfig, WebSocketConnector,
};

const DEFAULT_LOG_FILTER: &str = "info,voicelink_webrtc=debug";

/// VoiceLink call client
///
/// Negotiates a WebRTC audio call with one remote participant through a
/// WebSocket rendezvous server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; flags below override its values
    #[arg(short, long, env = "VOICELINK_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket signaling URL
    #[arg(long, env = "VOICELINK_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "VOICELINK_STUN_SERVERS")]
    stun_servers: Option<Vec<String>>,

    /// TURN server URL
    #[arg(
        long,
        env = "VOICELINK_TURN_URL",
        requires = "turn_username",
        requires = "turn_credential"
    )]
    turn_url: Option<String>,

    /// TURN username
    #[arg(long, env = "VOICELINK_TURN_USERNAME")]
    turn_username: Option<String>,

    /// TURN credential
    #[arg(long, env = "VOICELINK_TURN_CREDENTIAL")]
    turn_credential: Option<String>,

    /// Negotiation role
    #[arg(short, long, env = "VOICELINK_ROLE")]
    role: Option<RoleArg>,

    /// Simulate a microphone permission denial
    #[arg(long)]
    deny_capture: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "VOICELINK_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum RoleArg {
    /// Create the offer once signaling is open
    Caller,
    /// Wait for the remote offer and answer it
    Callee,
}

impl From<RoleArg> for CallRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Caller => CallRole::Caller,
            RoleArg::Callee => CallRole::Callee,
        }
    }
}

impl Args {
    /// Config file (or defaults) with flags layered on top
    fn call_config(&self) -> anyhow::Result<CallConfig> {
        let mut config = match &self.config {
            Some(path) => CallConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CallConfig::default(),
        };

        if let Some(url) = &self.signaling_url {
            config.signaling_url = url.clone();
        }
        if let Some(stun) = &self.stun_servers {
            config.stun_servers = stun.clone();
        }
        if let (Some(url), Some(username), Some(credential)) =
            (&self.turn_url, &self.turn_username, &self.turn_credential)
        {
            config.turn_servers.push(TurnServerConfig {
                url: url.clone(),
                username: username.clone(),
                credential: credential.clone(),
            });
        }
        if let Some(role) = self.role {
            config.role = role.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up Ctrl+C handler before anything else
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, hanging up...");

        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(0);
        }

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(3));
            eprintln!("Graceful shutdown timed out after 3s, forcing exit");
            std::process::exit(0);
        });
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("voice-call-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing(args.log_json)?;

    let config = args.call_config()?;
    info!(
        version = voicelink_webrtc::version(),
        signaling_url = %config.signaling_url,
        role = ?config.role,
        stun_servers = config.stun_servers.len(),
        turn_servers = config.turn_servers.len(),
        "VoiceLink call client starting"
    );

    let coordinator = Coordinator::new(
        config,
        Arc::new(WebSocketConnector::new()),
        Arc::new(RtcPeerEngineFactory::new()),
        Arc::new(HeadlessMediaEndpoint::with_capture(!args.deny_capture)),
    );
    let (call, task) = coordinator.spawn();

    info!("Call running. Type r to reconnect, s to stop, q to quit, or press Ctrl+C.");
    serve(&call, &shutdown_flag).await?;

    info!("Hanging up...");
    // The task may already have exited if the handle's channel closed
    if let Err(e) = call.shutdown().await {
        warn!("{}", e);
    }
    task.await.context("call coordinator task panicked")??;

    info!("Call client shut down gracefully");
    Ok(())
}

/// Report state changes and relay stdin commands until quit or Ctrl+C
async fn serve(call: &CallHandle, shutdown_flag: &AtomicBool) -> anyhow::Result<()> {
    let mut states = call.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!(state = %call.state(), "Call state: {}", call.state().display_name());

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    warn!("Call coordinator stopped");
                    return Ok(());
                }
                let state = *states.borrow_and_update();
                info!(state = %state, "Call state: {}", state.display_name());
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" | "reconnect" => call.reconnect().await?,
                    "s" | "stop" => call.stop().await?,
                    "q" | "quit" => return Ok(()),
                    "" => {}
                    other => warn!("Unknown command '{}', expected r, s or q", other),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = wait_for_flag(shutdown_flag) => return Ok(()),
        }
    }
}

async fn wait_for_flag(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    // RUST_LOG wins over the default filter
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
