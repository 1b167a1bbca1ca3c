//! Port Mirror Command Line Tool
//!
//! This binary is the command-line interface for Port Mirror.

use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use port_mirror::common::{init_logger, LogOutput};
use port_mirror::config::{log_config, validate_config, Config, ConfigValidator, DEFAULT_CONFIG_FILE};
use port_mirror::{start_mirrors, DialerRegistry, SessionRegistry, APP_NAME, VERSION};

/// Port Mirror: relay local TCP ports to remote targets through proxy chains
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file
    #[clap(long = "conf", env = "PORT_MIRROR_CONF", default_value = DEFAULT_CONFIG_FILE)]
    conf: String,

    /// Log level (off, error, warn, info, debug, trace), overrides the file
    #[clap(long = "log")]
    log: Option<String>,

    /// Log output: stdout, stderr or a file path, overrides the file
    #[clap(long = "log-output")]
    log_output: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::from_file(&args.conf) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("load config {} fail: {}", args.conf, e);
            process::exit(1);
        }
    };

    if let Some(level) = args.log {
        config.log_level = level;
    }
    if let Some(output) = args.log_output {
        config.log_file = output;
    }

    if let Err(e) = init_logger(&config.log_level, &LogOutput::parse(&config.log_file)) {
        eprintln!("{}", e);
        process::exit(1);
    }

    info!("Starting {} v{}", APP_NAME, VERSION);
    log_config(&config);

    for warning in config.check_warnings() {
        warn!("{}", warning);
    }

    if let Err(e) = validate_config(&config) {
        error!("{}", e);
        process::exit(2);
    }

    let registry = Arc::new(SessionRegistry::new());
    let dialers = Arc::new(DialerRegistry::with_defaults());

    let handles = match start_mirrors(&config, registry, dialers).await {
        Ok(handles) => handles,
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    };

    info!("{} mirror(s) running, press Ctrl+C to stop", handles.len());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, exiting"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}
