use crate::config::Config;
use clap::{Arg, ArgAction, Command};
use tracing::info;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_TIMESTAMP: &str = env!("VERGEN_BUILD_TIMESTAMP");
const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

/// CLI arguments structure
#[derive(Debug)]
pub struct CliArgs {
    pub config_file: Option<String>,
    pub log_level: Option<String>,
    pub validate_only: bool,
    pub print_config: bool,
}

/// Parse command line arguments
pub fn parse_cli_args() -> CliArgs {
    let matches = Command::new("Project Maester")
        .version(VERSION)
        .author("The Citadel")
        .about("Consistency and resilience layer for university records")
        .long_about(format!(
            "Project Maester - Academic Records Sync Server\n\
             Version: {VERSION}\n\
             Build: {BUILD_TIMESTAMP}\n\
             Git SHA: {GIT_SHA}\n\n\
             Keeps teacher and course records consistent across the auth,\n\
             academic, and profiles stores, queueing failed writes for\n\
             replay when a store comes back."
        ))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .long_help("Path to the configuration file. Defaults to the environment-specific file (config/development.toml or config/secret.toml)")
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level override (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("validate")
                .long("validate")
                .action(ArgAction::SetTrue)
                .help("Validate configuration and exit"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Print the effective configuration and exit"),
        )
        .get_matches();

    CliArgs {
        config_file: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        validate_only: matches.get_flag("validate"),
        print_config: matches.get_flag("print-config"),
    }
}

/// Apply CLI overrides to configuration
pub fn apply_cli_overrides(mut config: Config, args: &CliArgs) -> Config {
    if let Some(path) = &args.config_file {
        info!("Using configuration override from CLI: {}", path);
    }
    if let Some(level) = &args.log_level {
        info!("Using log level override from CLI: {}", level);
        config.logging.level = level.clone();
    }
    config
}

/// Print Maester ASCII art
pub fn print_maester_ascii_art() {
    println!(
        r#"

    ███╗   ███╗ █████╗ ███████╗███████╗████████╗███████╗██████╗
    ████╗ ████║██╔══██╗██╔════╝██╔════╝╚══██╔══╝██╔════╝██╔══██╗
    ██╔████╔██║███████║█████╗  ███████╗   ██║   █████╗  ██████╔╝
    ██║╚██╔╝██║██╔══██║██╔══╝  ╚════██║   ██║   ██╔══╝  ██╔══██╗
    ██║ ╚═╝ ██║██║  ██║███████╗███████║   ██║   ███████╗██║  ██║
    ╚═╝     ╚═╝╚═╝  ╚═╝╚══════╝╚══════╝   ╚═╝   ╚══════╝╚═╝  ╚═╝
    "#
    );
}

/// Print application version and build information
pub fn print_version_info() {
    print_maester_ascii_art();
    println!();
    println!("Version: {VERSION}");
    println!("Build Timestamp: {BUILD_TIMESTAMP}");
    println!("Git SHA: {GIT_SHA}");
    println!("Rust Version: {}", env!("VERGEN_RUSTC_SEMVER"));
    println!("Target: {}", env!("VERGEN_CARGO_TARGET_TRIPLE"));
    println!();
}
