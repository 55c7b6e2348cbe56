use std::path::PathBuf;

use bridge_bus::Bus;
use bridge_daemon::config;
use bridge_daemon::routes::build_router;
use bridge_daemon::state::AppState;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridge-daemon", about = "Bridges the Senso, Flex and RFID devices to the browser")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Push a firmware image to a Senso directly, without starting the daemon.
    UpdateFirmware {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        serial: Option<String>,
        #[arg(short, long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Some(Command::UpdateFirmware { image, serial, address }) => run_update_firmware(image, serial, address).await,
        None => run_daemon().await,
    };
    std::process::exit(exit_code);
}

async fn run_update_firmware(image: PathBuf, serial: Option<String>, address: Option<String>) -> i32 {
    let image = match std::fs::read(&image) {
        Ok(bytes) => bytes,
        Err(error) => {
            error!(%error, path = %image.display(), "could not read firmware image");
            return 1;
        }
    };

    let config = match config::load_config() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "could not load configuration");
            return 1;
        }
    };

    let bus = Bus::new();
    let cancel = CancellationToken::new();
    let handle = match senso_session::Handle::with_control_port(bus, cancel, config.senso.control_port) {
        Ok(handle) => handle,
        Err(error) => {
            error!(%error, "could not start service discovery");
            return 1;
        }
    };

    let request = senso_firmware::UpdateRequest {
        serial,
        address,
        image,
        dfu_port: config.senso.dfu_port,
        tftp_port: config.tftp.port,
    };
    let result = handle
        .process_firmware_update(request, |message| {
            info!(?message, "firmware update progress");
        })
        .await;

    match result {
        Ok(()) => 0,
        Err(error) => {
            error!(%error, "firmware update failed");
            1
        }
    }
}

async fn run_daemon() -> i32 {
    let config = match config::load_config() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "could not load configuration");
            return 1;
        }
    };

    let bus = Bus::new();
    let root_cancel = CancellationToken::new();

    let senso = match senso_session::Handle::with_control_port(bus.clone(), root_cancel.clone(), config.senso.control_port) {
        Ok(handle) => handle,
        Err(error) => {
            error!(%error, "could not start service discovery");
            return 1;
        }
    };

    let flex_port_config = flex_serial::PortConfig { usb_vid: config.flex.usb_vid, baud: config.flex.baud };
    tokio::spawn(flex_serial::run(root_cancel.child_token(), bus.clone(), flex_port_config));
    tokio::spawn(rfid_pcsc::run(root_cancel.child_token(), bus.clone()));

    let state = AppState::new(bus, senso, root_cancel.clone(), config.clone());
    state.spawn_reader_tracker();

    let router = build_router(state);
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, addr = %config.bind_addr, "could not bind");
            return 1;
        }
    };

    info!(addr = %config.bind_addr, "bridge daemon listening");
    let result = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await;
    root_cancel.cancel();

    match result {
        Ok(()) => {
            info!("bridge daemon shut down gracefully");
            0
        }
        Err(error) => {
            error!(%error, "server error");
            1
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
