// crates/cli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use courier_config::{Config, ConfigManager};
use std::path::PathBuf;

mod commands;
mod settings;

fn build_cli() -> Command {
    Command::new("courier")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Deduplicating, caching HTTP client with resumable chunked uploads")
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml (defaults to the platform config dir)")
                .global(true),
        )
        .arg(
            Arg::new("base-url")
                .short('b')
                .long("base-url")
                .value_name("URL")
                .help("Base URL for relative paths, overriding the config file")
                .global(true),
        )
        .subcommand(
            Command::new("get")
                .about("Send a GET request and print the response")
                .arg(
                    Arg::new("url")
                        .required(true)
                        .value_name("URL")
                        .help("Absolute URL or path under the base URL"),
                )
                .arg(
                    Arg::new("param")
                        .short('p')
                        .long("param")
                        .value_name("KEY=VALUE")
                        .help("Query parameter; repeat a key to send a list")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("header")
                        .short('H')
                        .long("header")
                        .value_name("NAME:VALUE")
                        .help("Request header")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("no-cache")
                        .long("no-cache")
                        .help("Bypass the response cache")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("repeat")
                        .short('n')
                        .long("repeat")
                        .value_name("COUNT")
                        .help("Fire COUNT identical requests at once")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("stats")
                        .long("stats")
                        .help("Print cache and queue statistics afterwards")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a file in resumable chunks")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_name("FILE")
                        .help("File to upload"),
                )
                .arg(
                    Arg::new("chunk-size")
                        .short('c')
                        .long("chunk-size")
                        .value_name("BYTES")
                        .help("Chunk size for this upload")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("concurrency")
                        .short('j')
                        .long("concurrency")
                        .value_name("N")
                        .help("Chunks uploaded at once")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or manage the configuration file")
                .subcommand(
                    Command::new("init").about("Write a default config file if none exists"),
                )
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("path").about("Print the config file location"))
                .subcommand(
                    Command::new("validate").about("Check the config file for invalid values"),
                )
                .subcommand(
                    Command::new("reset").about("Overwrite the config file with defaults"),
                ),
        )
}

fn config_manager(matches: &clap::ArgMatches) -> Result<ConfigManager> {
    let manager = match matches.get_one::<String>("config-dir") {
        Some(dir) => ConfigManager::with_directory(PathBuf::from(dir)),
        None => ConfigManager::new(),
    };
    manager.context("Failed to resolve config directory")
}

/// File, then `COURIER_*` variables, then command-line flags
fn effective_config(manager: &ConfigManager, matches: &clap::ArgMatches) -> Result<Config> {
    let mut config = manager
        .load_with_env_overrides()
        .context("Failed to load configuration")?;

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.request.base_url = Some(base_url.clone());
    }

    if let Err(errors) = config.validate() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        bail!("Invalid configuration:\n  {}", messages.join("\n  "));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = build_cli().get_matches();
    let manager = config_manager(&matches)?;

    match matches.subcommand() {
        Some(("get", sub_matches)) => {
            let config = effective_config(&manager, &matches)?;
            commands::get_url(&config, sub_matches).await
        }
        Some(("upload", sub_matches)) => {
            let config = effective_config(&manager, &matches)?;
            commands::upload_file(&config, sub_matches).await
        }
        Some(("config", sub_matches)) => match sub_matches.subcommand() {
            Some(("init", _)) => commands::config_init(&manager),
            Some(("show", _)) => {
                let config = effective_config(&manager, &matches)?;
                commands::config_show(&config)
            }
            Some(("path", _)) => {
                println!("{}", manager.config_path().display());
                Ok(())
            }
            Some(("validate", _)) => commands::config_validate(&manager),
            Some(("reset", _)) => commands::config_reset(&manager),
            _ => {
                build_cli().print_help()?;
                Ok(())
            }
        },
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}
