//! Local CLI settings

use crate::config::Config;
use crate::output::{self, OutputFormat};
use crate::ConfigCommands;
use anyhow::Result;

pub fn handle_config_command(command: ConfigCommands, config: &mut Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if shown.api_key.is_some() {
                shown.api_key = Some("********".to_string());
            }
            output::print_yaml(&shown)?;
            output::print_info(&format!("File: {}", Config::config_path()?.display()));
        }

        ConfigCommands::Set {
            server,
            api_key,
            output: default_output,
        } => {
            if let Some(server) = server {
                config.default_server = server;
            }
            if let Some(key) = api_key {
                config.api_key = (!key.is_empty()).then_some(key);
            }
            if let Some(format) = default_output {
                if OutputFormat::parse(&format) == OutputFormat::Table && format != "table" {
                    output::print_warning(&format!("Unknown output '{}', using table", format));
                    config.default_output = "table".to_string();
                } else {
                    config.default_output = format.to_lowercase();
                }
            }

            let path = config.save()?;
            output::print_success(&format!("Settings saved to {}", path.display()));
        }
    }

    Ok(())
}
