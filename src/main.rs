use clap::Parser;
use log::info;
use possync::cli::Cli;
use possync::config::{ApplicationConfig, SharedConfiguration};
use possync::fix_reader::FixReader;
use possync::logging::setup_logging;
use possync::peer_table::{PeerTableMaintenance, SharedPeerTable};
use possync::service::{ServiceSettings, SyncService};
use possync::subscribers::PositionObserver;
use possync::thread_manager::ThreadManager;
use possync::types::PositionUpdate;

struct PositionLogger;

impl PositionObserver for PositionLogger {
    fn on_position_update(&self, update: &PositionUpdate) {
        info!(
            "Main: {} at {:.6}, {:.6} (last seen {})",
            update.callsign,
            update.latitude,
            update.longitude,
            update.last_seen_at.format("%H:%M:%S")
        );
    }
}

fn exit_with_error(context: &str, error: &dyn std::fmt::Display) -> ! {
    log::error!("{context}: {error}");
    std::process::exit(1)
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.logging_level);

    let mut application_config = ApplicationConfig::construct_from_path(&cli.config_file)
        .unwrap_or_else(|e| exit_with_error("Config error", &e));
    if let Some(callsign) = cli.callsign {
        application_config.identity.callsign = callsign;
    }
    if let Some(peer) = cli.peer {
        application_config.peer.address = peer;
    }
    info!("Main: Application started.");

    let settings = ServiceSettings::from(&application_config);
    let retention =
        chrono::TimeDelta::seconds(application_config.peers.retention_seconds.into());
    let configuration = std::sync::Arc::new(SharedConfiguration::new(application_config));
    let service = std::sync::Arc::new(SyncService::new(settings));

    let peer_table = std::sync::Arc::new(SharedPeerTable::new(retention));
    let position_logger = std::sync::Arc::new(PositionLogger);
    service.subscribe(&peer_table);
    service.subscribe(&position_logger);

    service
        .start_with_configuration(configuration)
        .unwrap_or_else(|e| exit_with_error("Unable to start position sync", &e));

    let mut thread_manager = ThreadManager::new();
    let maintenance_task_id = thread_manager
        .add_task(
            "peer-table",
            PeerTableMaintenance::new(peer_table.as_ref().clone()),
            std::time::Duration::from_secs(30),
        )
        .unwrap_or_else(|e| exit_with_error("Unable to start peer table maintenance", &e));
    let reader_task_id = thread_manager
        .add_task(
            "fix-reader",
            FixReader::new(std::io::BufReader::new(std::io::stdin()), service.clone()),
            std::time::Duration::ZERO,
        )
        .unwrap_or_else(|e| exit_with_error("Unable to start fix reader", &e));

    if let Some(duration) = cli.duration {
        std::thread::sleep(std::time::Duration::from_secs(duration));
    } else {
        thread_manager.wait_on_task_finish(reader_task_id);
    }

    info!(
        "Main: Stopping with {} messages still queued",
        service.pending_messages()
    );
    if let Err(e) = service.stop() {
        log::error!("Main: {e}");
    }
    thread_manager.stop_task(maintenance_task_id);
    thread_manager.wait_on_task_finish(maintenance_task_id);

    info!("Main: Program finished.");
}
