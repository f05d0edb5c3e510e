// src/main.rs

use cuksync::services::cukcuk::CukcukClient;
use cuksync::services::directus::DirectusClient;
use cuksync::utils::logger::{init_logger, Logger};
use cuksync::{log_error, log_info, Orchestrator, SyncConfig};

#[tokio::main]
async fn main() {
    init_logger(Logger::from_env().get_level().clone());

    let config = SyncConfig::from_env();
    let report = config.validate();
    if !report.valid {
        log_error!(
            "Configuration invalid",
            serde_json::json!({ "errors": report.errors })
        );
        std::process::exit(1);
    }

    let source = match CukcukClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            log_error!(
                "Failed to initialize CukCuk client",
                serde_json::json!({ "error": err.to_string() })
            );
            std::process::exit(1);
        }
    };
    let store = match DirectusClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            log_error!(
                "Failed to initialize Directus client",
                serde_json::json!({ "error": err.to_string() })
            );
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(&config, &source, &store);
    match orchestrator.run().await {
        Ok(summary) => {
            log_info!(
                "Run summary",
                serde_json::json!({
                    "processed": summary.total_processed(),
                    "created": summary.total_created(),
                    "updated": summary.total_updated(),
                    "failed": summary.total_failed(),
                })
            );
            std::process::exit(if summary.succeeded() { 0 } else { 1 });
        }
        Err(err) => {
            log_error!(
                "Sync run aborted",
                serde_json::json!({ "error": err.to_string() })
            );
            std::process::exit(1);
        }
    }
}
