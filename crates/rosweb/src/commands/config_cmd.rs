//! Config subcommand handlers.

use std::collections::HashMap;

use rosweb_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::available_profiles;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = rosweb_config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let endpoint = global
                .endpoint
                .clone()
                .unwrap_or_else(rosweb_config::default_endpoint);
            let profile = Profile::new(endpoint);
            let cfg = Config::default();

            // Reject a bad endpoint now rather than on first connect.
            rosweb_config::profile_to_session_config(&profile, &cfg.defaults)?;

            let cfg = Config {
                profiles: HashMap::from([("default".to_owned(), profile)]),
                ..cfg
            };
            let written = rosweb_config::save_config(&cfg)?;
            output::print_output(&format!("Wrote {}", written.display()), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = rosweb_config::load_config()?;
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            })?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &rosweb_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = rosweb_config::load_config()?;
            let current = cfg.profile_name(None).to_owned();
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort_unstable();
            let listing = names
                .into_iter()
                .map(|name| {
                    let marker = if *name == current { "*" } else { " " };
                    format!("{marker} {name}  {}", cfg.profiles[name].endpoint)
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&listing, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = rosweb_config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            rosweb_config::save_config(&cfg)?;
            output::print_output(&format!("Default profile set to '{name}'"), global.quiet);
            Ok(())
        }
    }
}
