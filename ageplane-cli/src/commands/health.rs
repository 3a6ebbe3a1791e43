//! Server health command

use crate::api::ApiClient;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde_json::Value;

pub async fn handle_health_command(api: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: Value = api.get_raw("/health").await?;
    let readiness: Value = match api.get_raw::<Value>("/health/ready").await {
        Ok(ready) => ready,
        Err(e) => serde_json::json!({"ready": false, "reason": e.to_string()}),
    };

    if format != OutputFormat::Table {
        let combined = serde_json::json!({"health": health, "readiness": readiness});
        return match format {
            OutputFormat::Yaml => output::print_yaml(&combined),
            _ => output::print_json(&combined),
        };
    }

    let status = health["status"].as_str().unwrap_or("unknown");
    let version = health["version"].as_str().unwrap_or("unknown");
    let uptime = health["uptimeSeconds"].as_u64().unwrap_or(0);

    if status == "healthy" {
        output::print_success(&format!("Server is {} (version {})", status, version));
    } else {
        output::print_warning(&format!("Server is {} (version {})", status, version));
    }
    output::print_info(&format!("Uptime: {}", output::format_duration(uptime)));

    if readiness["ready"].as_bool().unwrap_or(false) {
        output::print_success("Cluster connection is ready");
    } else {
        let reason = readiness["reason"].as_str().unwrap_or("not ready");
        output::print_warning(&format!("Not ready: {}", reason));
    }

    Ok(())
}
