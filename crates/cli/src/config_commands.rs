use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use parley_config::{Severity, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load and validate the configuration, then report errors/warnings.
    Check,
    /// Print the effective configuration as TOML.
    Show,
    /// Print where the configuration is read from.
    Path,
}

pub fn handle_config(action: &ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(explicit),
        ConfigAction::Show => {
            let (_, config) = load(explicit)?;
            println!("{}", toml_string(&config)?);
            Ok(())
        },
        ConfigAction::Path => {
            match resolve(explicit) {
                Some(path) => println!("{}", path.display()),
                None => println!("(defaults, no config file found)"),
            }
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn resolve(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(parley_config::find_config_file)
}

fn load(explicit: Option<&Path>) -> Result<(Option<PathBuf>, parley_config::ParleyConfig)> {
    let path = resolve(explicit);
    let config = match &path {
        Some(path) => parley_config::load_config(path)?,
        None => parley_config::ParleyConfig::default(),
    };
    Ok((path, config))
}

fn toml_string(config: &parley_config::ParleyConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

fn check(explicit: Option<&Path>) -> Result<()> {
    let (path, config) = load(explicit)?;
    match &path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let result = parley_config::validate(&config);
    for line in render(&result) {
        eprintln!("{line}");
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if !result.diagnostics.is_empty() {
        eprintln!();
    }
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn render(result: &ValidationResult) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .map(|d| {
            let color = match d.severity {
                Severity::Error => RED,
                Severity::Warning => YELLOW,
            };
            if d.path.is_empty() {
                format!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message)
            } else {
                format!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message)
            }
        })
        .collect()
}
