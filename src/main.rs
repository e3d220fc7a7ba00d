use rocket_dashboard::config::Config;
use rocket_dashboard::service_utils::{
    handle_shutdown, log_last_packet, periodic_status_update, start_mqtt_client,
    watch_receivers, Dashboard,
};
use std::time::Duration;
use tokio::task::LocalSet;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {:?}", e);
            return;
        }
    };
    info!("Configuration loaded for {:?} environment.", config.environment);

    // MQTT clients are single-threaded; everything runs on one LocalSet.
    let local = LocalSet::new();
    local
        .run_until(async move {
            let dashboard = Dashboard::connect(&config);

            let event_loops: Vec<_> = dashboard
                .clients()
                .into_iter()
                .map(|(label, client)| start_mqtt_client(client.clone(), label))
                .collect();

            let watch = watch_receivers(&dashboard.topics);
            let status_task = periodic_status_update(watch, Duration::from_secs(30));

            if let Some(telemetry) = dashboard.topic("receiver-1/telemetry-packet") {
                log_last_packet(telemetry);
            }

            handle_shutdown(&dashboard).await;

            status_task.abort();
            for handle in event_loops {
                // Loops whose connection never ended would block shutdown.
                handle.abort();
            }
            info!("All MQTT clients shut down.");
        })
        .await;
}
