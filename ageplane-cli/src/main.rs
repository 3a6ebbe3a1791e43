//! ageplane CLI
//!
//! Command-line client for the ageplane API server

mod api;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "ageplane", author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// API server address (defaults to the configured server)
    #[arg(short, long, global = true, env = "AGEPLANE_SERVER")]
    server: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, global = true, env = "AGEPLANE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, global = true)]
    output: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health and cluster readiness
    Health,
    /// Manage customer instances
    Customer {
        #[command(subcommand)]
        command: CustomerCommands,
    },
    /// Show or change local CLI settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// List customer instances
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        /// Only instances in this phase (Creating, Running, Failed)
        #[arg(long)]
        phase: Option<String>,
    },
    /// Show a customer instance
    Get { name: String },
    /// Show the status of a customer instance
    Status { name: String },
    /// Create a customer instance
    Create {
        /// Customer name (lowercase letters, digits and hyphens, at most 20 characters)
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        /// Operator image tag (default: latest)
        #[arg(long)]
        image_tag: Option<String>,
        #[arg(long)]
        cpu_request: Option<String>,
        #[arg(long)]
        memory_request: Option<String>,
        #[arg(long)]
        cpu_limit: Option<String>,
        #[arg(long)]
        memory_limit: Option<String>,
        #[arg(long)]
        storage_size: Option<String>,
        #[arg(long)]
        storage_class: Option<String>,
        #[arg(long)]
        backup_size: Option<String>,
        /// Enable high availability
        #[arg(long)]
        ha: bool,
        /// Enable backups
        #[arg(long)]
        backup: bool,
        /// Enable monitoring
        #[arg(long)]
        monitoring: bool,
        /// Label as key=value; repeatable
        #[arg(long = "label", value_parser = commands::customer::parse_label)]
        labels: Vec<(String, String)>,
    },
    /// Change the image tag or labels of a customer instance
    Update {
        name: String,
        #[arg(long)]
        image_tag: Option<String>,
        /// Label as key=value; repeatable
        #[arg(long = "label", value_parser = commands::customer::parse_label)]
        labels: Vec<(String, String)>,
    },
    /// Delete a customer instance and all of its resources
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Wait until a customer instance is running
    Wait {
        name: String,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
        /// Seconds between status checks
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current settings
    Show,
    /// Store default server, API key or output format
    Set {
        #[arg(long)]
        server: Option<String>,
        /// Empty string clears the stored key
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            output::print_warning(&format!("Ignoring CLI settings: {:#}", e));
            config::Config::default()
        }
    };

    let server = cli.server.clone().unwrap_or_else(|| config.default_server.clone());
    let api_key = cli.api_key.clone().or_else(|| config.api_key.clone());
    let format = OutputFormat::parse(cli.output.as_deref().unwrap_or(&config.default_output));

    match cli.command {
        Commands::Health => {
            let api = api::ApiClient::new(&server, api_key)?;
            commands::health::handle_health_command(&api, format).await?
        }
        Commands::Customer { command } => {
            let api = api::ApiClient::new(&server, api_key)?;
            commands::customer::handle_customer_command(command, &api, format).await?
        }
        Commands::Config { command } => {
            commands::settings::handle_config_command(command, &mut config)?
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
        }
    }

    Ok(())
}

/// Generate shell completions
fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_parses_labels_and_flags() {
        let cli = Cli::try_parse_from([
            "ageplane",
            "--output",
            "json",
            "customer",
            "create",
            "acme",
            "--image-tag",
            "v1",
            "--ha",
            "--label",
            "team=platform",
            "--label",
            "env=prod",
        ])
        .unwrap();

        assert_eq!(cli.output.as_deref(), Some("json"));
        match cli.command {
            Commands::Customer {
                command:
                    CustomerCommands::Create {
                        name,
                        image_tag,
                        ha,
                        labels,
                        ..
                    },
            } => {
                assert_eq!(name, "acme");
                assert_eq!(image_tag.as_deref(), Some("v1"));
                assert!(ha);
                assert_eq!(labels.len(), 2);
                assert_eq!(labels[0], ("team".to_string(), "platform".to_string()));
            }
            _ => panic!("expected customer create"),
        }
    }

    #[test]
    fn test_bad_label_is_rejected() {
        assert!(Cli::try_parse_from([
            "ageplane", "customer", "update", "acme", "--label", "oops"
        ])
        .is_err());
    }
}
