//! Config validation CLI tool
//!
//! Validates a buildmoded configuration file and reports any errors.

use buildmode_api::RestrictionMode;
use buildmode_config::{ConfigError, CURRENT_CONFIG_VERSION};
use buildmode_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a buildmoded configuration file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match buildmode_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", config.service.socket_path.display());
            println!("  Data dir: {}", config.service.data_dir.display());
            println!(
                "  Check interval: {}",
                format_duration(config.service.check_interval)
            );
            println!(
                "  Session length: {}",
                format_duration(config.session.duration)
            );
            println!("  Cooldown: {}", format_duration(config.session.cooldown));
            println!("  Tool item: {}", config.session.tool_item);

            let (mode, list) = match config.restrictions.mode {
                RestrictionMode::Blacklist => ("blacklist", &config.restrictions.blacklist),
                RestrictionMode::Whitelist => ("whitelist", &config.restrictions.whitelist),
            };
            let mut items: Vec<_> = list.iter().map(|i| i.as_str()).collect();
            items.sort_unstable();
            println!("  Restriction mode: {} ({} items)", mode, items.len());
            for item in items {
                println!("    - {}", item);
            }

            if !config.warnings.is_empty() {
                println!();
                println!("Skipped entries ({}):", config.warnings.len());
                for warning in &config.warnings {
                    println!("  - {}", warning);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
