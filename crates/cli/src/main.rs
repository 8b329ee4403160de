use clap::Parser;
use planet::{Config, Planet};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "planet-server",
    about = "Master server registry for NFK multiplayer sessions"
)]
struct Args {
    /// Path to the TOML config file (created with defaults if missing)
    #[arg(long, short, default_value = "planet.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    address: Option<String>,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the worker thread count
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(address) = args.address {
        config.network.address = address;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(workers) = args.workers {
        config.network.workers = Some(workers);
    }

    let mut server = Planet::new(config);
    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }

    println!(
        "Master server on {} — press Enter to stop",
        server
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    );
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
    ExitCode::SUCCESS
}
