//! Customer instance commands

use crate::api::ApiClient;
use crate::output::{self, OutputFormat};
use crate::CustomerCommands;
use ageplane_common::{
    CreateCustomerRequest, CustomerConfig, CustomerInstance, CustomerListResponse, InstancePhase,
    InstanceStatus, UpdateCustomerRequest,
};
use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tabled::Tabled;

#[derive(Tabled)]
struct CustomerRow {
    name: String,
    display_name: String,
    image_tag: String,
    phase: String,
    ready: String,
    namespace: String,
    age: String,
}

impl From<&CustomerInstance> for CustomerRow {
    fn from(instance: &CustomerInstance) -> Self {
        Self {
            name: instance.name.clone(),
            display_name: output::truncate(&instance.display_name, 24),
            image_tag: instance.image_tag.clone(),
            phase: output::colored_phase(&instance.status.phase.to_string()),
            ready: format!(
                "{}/{}",
                instance.status.ready_replicas, instance.status.replicas
            ),
            namespace: instance.namespace.clone(),
            age: output::format_relative_time(instance.created_at, Utc::now()),
        }
    }
}

#[derive(Tabled)]
struct FieldRow {
    field: String,
    value: String,
}

fn field(name: &str, value: impl ToString) -> FieldRow {
    FieldRow {
        field: name.to_string(),
        value: value.to_string(),
    }
}

fn detail_rows(instance: &CustomerInstance) -> Vec<FieldRow> {
    let resources = &instance.config.resources;
    let or_default = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let mut rows = vec![
        field("Name", &instance.name),
        field("Display Name", &instance.display_name),
        field("Namespace", &instance.namespace),
        field("Image Tag", &instance.image_tag),
        field("Phase", output::colored_phase(&instance.status.phase.to_string())),
        field("Message", &instance.status.message),
        field(
            "Replicas",
            format!(
                "{}/{}",
                instance.status.ready_replicas, instance.status.replicas
            ),
        ),
        field(
            "CPU",
            format!(
                "{} request / {} limit",
                or_default(&resources.requests.cpu),
                or_default(&resources.limits.cpu)
            ),
        ),
        field(
            "Memory",
            format!(
                "{} request / {} limit",
                or_default(&resources.requests.memory),
                or_default(&resources.limits.memory)
            ),
        ),
        field("Storage", or_default(&instance.config.storage.size)),
        field("High Availability", instance.config.high_availability),
        field("Backups", instance.config.backup_enabled),
        field("Monitoring", instance.config.monitoring_enabled),
        field("Created", instance.created_at.to_rfc3339()),
        field("Updated", instance.updated_at.to_rfc3339()),
    ];

    for (key, value) in &instance.labels {
        rows.push(field(&format!("Label {}", key), value));
    }

    rows
}

fn status_rows(status: &InstanceStatus) -> Vec<FieldRow> {
    vec![
        field("Phase", output::colored_phase(&status.phase.to_string())),
        field("Ready", status.ready),
        field("Replicas", format!("{}/{}", status.ready_replicas, status.replicas)),
        field("Message", &status.message),
        field("Last Updated", status.last_updated.to_rfc3339()),
    ]
}

/// Parse a `key=value` label argument
pub fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid label '{}', expected key=value", raw)),
    }
}

fn customer_path(name: &str) -> String {
    format!("/api/v1/customers/{}", urlencoding::encode(name))
}

pub async fn handle_customer_command(
    command: CustomerCommands,
    api: &ApiClient,
    format: OutputFormat,
) -> Result<()> {
    match command {
        CustomerCommands::List {
            page,
            page_size,
            phase,
        } => {
            let mut path = format!("/api/v1/customers?page={}&pageSize={}", page, page_size);
            if let Some(phase) = phase {
                path.push_str(&format!("&phase={}", phase));
            }

            let list: CustomerListResponse = api.get(&path).await?;
            let rows: Vec<CustomerRow> = list.customers.iter().map(CustomerRow::from).collect();
            output::print_output(&list, rows, format)?;

            if format == OutputFormat::Table && list.total > 0 {
                output::print_info(&format!(
                    "Page {} ({} per page), {} total{}",
                    list.page,
                    list.page_size,
                    list.total,
                    if list.has_next { ", more on the next page" } else { "" }
                ));
            }
        }

        CustomerCommands::Get { name } => {
            let instance: CustomerInstance = api.get(&customer_path(&name)).await?;
            output::print_output(&instance, detail_rows(&instance), format)?;
        }

        CustomerCommands::Status { name } => {
            let status: InstanceStatus = api.get(&format!("{}/status", customer_path(&name))).await?;
            output::print_output(&status, status_rows(&status), format)?;
        }

        CustomerCommands::Create {
            name,
            display_name,
            image_tag,
            cpu_request,
            memory_request,
            cpu_limit,
            memory_limit,
            storage_size,
            storage_class,
            backup_size,
            ha,
            backup,
            monitoring,
            labels,
        } => {
            let mut config = CustomerConfig::default();
            config.resources.requests.cpu = cpu_request;
            config.resources.requests.memory = memory_request;
            config.resources.limits.cpu = cpu_limit;
            config.resources.limits.memory = memory_limit;
            config.storage.size = storage_size;
            config.storage.storage_class = storage_class;
            config.storage.backup_size = backup_size;
            config.high_availability = ha;
            config.backup_enabled = backup;
            config.monitoring_enabled = monitoring;

            let request = CreateCustomerRequest {
                name: name.clone(),
                display_name: display_name.unwrap_or_default(),
                image_tag,
                config,
                labels: labels.into_iter().collect::<BTreeMap<_, _>>(),
            };

            let instance: CustomerInstance = api.post("/api/v1/customers", &request).await?;

            if format == OutputFormat::Table {
                output::print_success(&format!(
                    "Customer instance '{}' created in namespace {}",
                    instance.name, instance.namespace
                ));
                output::print_info(&format!("Wait for it: ageplane customer wait {}", name));
            } else {
                output::print_output(&instance, detail_rows(&instance), format)?;
            }
        }

        CustomerCommands::Update {
            name,
            image_tag,
            labels,
        } => {
            if image_tag.is_none() && labels.is_empty() {
                output::print_warning("Nothing to update; pass --image-tag or --label");
                return Ok(());
            }

            let request = UpdateCustomerRequest {
                image_tag,
                labels: (!labels.is_empty()).then(|| labels.into_iter().collect()),
                ..Default::default()
            };

            let instance: CustomerInstance = api.put(&customer_path(&name), &request).await?;

            if format == OutputFormat::Table {
                output::print_success(&format!(
                    "Customer instance '{}' updated (image tag {})",
                    instance.name, instance.image_tag
                ));
            } else {
                output::print_output(&instance, detail_rows(&instance), format)?;
            }
        }

        CustomerCommands::Delete { name, yes } => {
            use dialoguer::Confirm;

            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!(
                        "Delete customer instance '{}' and all of its resources?",
                        name
                    ))
                    .default(false)
                    .interact()?;

            if !confirmed {
                output::print_info("Deletion cancelled");
                return Ok(());
            }

            let report: serde_json::Value = api.delete(&customer_path(&name)).await?;

            if format == OutputFormat::Table {
                output::print_success(&format!("Customer instance '{}' deleted", name));
                for step in report["steps"].as_array().into_iter().flatten() {
                    output::print_info(&format!(
                        "{} {}: {}",
                        step["step"].as_str().unwrap_or("?"),
                        step["resource"].as_str().unwrap_or("?"),
                        step["outcome"].as_str().unwrap_or("?")
                    ));
                }
            } else {
                output::print_output(&report, Vec::<FieldRow>::new(), format)?;
            }
        }

        CustomerCommands::Wait {
            name,
            timeout,
            interval,
        } => {
            wait_until_running(api, &name, Duration::from_secs(timeout), Duration::from_secs(interval))
                .await?;
        }
    }

    Ok(())
}

/// Poll the status endpoint until the instance is running or the timeout passes
async fn wait_until_running(
    api: &ApiClient,
    name: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let path = format!("{}/status", customer_path(name));
    let started = Instant::now();

    loop {
        let status: InstanceStatus = api.get(&path).await?;
        spinner.set_message(format!(
            "{}: {} ({}/{} ready)",
            name, status.phase, status.ready_replicas, status.replicas
        ));

        match status.phase {
            InstancePhase::Running if status.ready => {
                spinner.finish_and_clear();
                output::print_success(&format!(
                    "Customer instance '{}' is running after {}",
                    name,
                    output::format_duration(started.elapsed().as_secs())
                ));
                return Ok(());
            }
            InstancePhase::Failed => {
                spinner.finish_and_clear();
                output::print_error(&format!("Customer instance '{}' failed: {}", name, status.message));
                anyhow::bail!("customer instance '{}' is in phase Failed", name);
            }
            _ => {}
        }

        if started.elapsed() >= timeout {
            spinner.finish_and_clear();
            anyhow::bail!(
                "timed out after {} waiting for '{}' (last phase {})",
                output::format_duration(timeout.as_secs()),
                name,
                status.phase
            );
        }

        tokio::time::sleep(interval).await;
    }
}
