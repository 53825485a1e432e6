use clap::{Parser, Subcommand};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iperf_relay::config::AgentConfig;
use iperf_relay::iperf3::params::{DEFAULT_DURATION_SECONDS, DEFAULT_PARALLEL_STREAMS, DEFAULT_PORT};
use iperf_relay::iperf3::{launch_and_run, ChannelSink, Iperf3Params, LiveMessage, Protocol};
use iperf_relay::web::create_axum_router;
use iperf_relay::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket endpoints (default)
    Serve,
    /// Run a single measurement and print the samples as JSON
    Measure {
        host: String,
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(short = 'R', long)]
        reverse: bool,
        #[arg(short, long, default_value_t = DEFAULT_DURATION_SECONDS)]
        time: u32,
        #[arg(short = 'P', long, default_value_t = DEFAULT_PARALLEL_STREAMS)]
        parallel: u32,
        #[arg(short, long)]
        udp: bool,
    },
}

impl Command {
    /// Builds the measurement parameters for `measure`, with zero values
    /// replaced by the same defaults the HTTP endpoints apply.
    fn measure_params(self) -> Option<Iperf3Params> {
        match self {
            Command::Serve => None,
            Command::Measure {
                host,
                port,
                reverse,
                time,
                parallel,
                udp,
            } => Some(
                Iperf3Params {
                    host,
                    port,
                    reverse,
                    duration_seconds: time,
                    parallel_streams: parallel,
                    protocol: if udp { Protocol::Udp } else { Protocol::Tcp },
                }
                .with_defaults(),
            ),
        }
    }
}

fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::daily(log_dir, "iperf-relay.log"));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    // Log to stderr so `measure` keeps stdout for JSON output.
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();
    guard
}

async fn serve(config: AgentConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listen_address = config.listen_address;
    let app = create_axum_router(Arc::new(config));

    let listener = TcpListener::bind(listen_address).await?;
    info!(address = %listen_address, "Listening for iperf3 requests.");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
            info!("Shutdown signal received.");
        })
        .await?;
    Ok(())
}

async fn measure(
    config: &AgentConfig,
    params: Iperf3Params,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (sink, mut rx) = ChannelSink::channel(16);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                LiveMessage::Sample(sample) => match serde_json::to_string(&sample) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!(error = %e, "Failed to serialize sample."),
                },
                LiveMessage::Result(result) => match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{text}"),
                    Err(e) => error!(error = %e, "Failed to serialize result."),
                },
            }
        }
    });

    let outcome = launch_and_run(&params, &config.iperf3_path, Some(Box::new(sink))).await;
    if let Err(e) = printer.await {
        error!(error = ?e, "Output task panicked.");
    }
    outcome?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let config = match AgentConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    let _guard = init_logging(&config.log_dir);
    info!(version = VERSION, "Starting iperf-relay...");

    match args.command.and_then(Command::measure_params) {
        Some(params) => measure(&config, params).await,
        None => serve(config).await,
    }
}
