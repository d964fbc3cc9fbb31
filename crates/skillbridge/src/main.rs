use std::path::PathBuf;
use std::process;

use anyhow::Context;

use skillbridge::bridge::text;
use skillbridge::config::{BridgeConfig, ConfigOverrides};
use skillbridge::diagnostics;
use skillbridge::session::{BRIDGE_EXIT_CODE, Bridge, CloseReason};
use skillbridge::store::JsonFileStore;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let overrides = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: skillbridge [--socket <path> | --host <addr> --port <port>] [options]");
            eprintln!();
            eprintln!("Started by the simulator with stdin/stdout as its expression pipe.");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --socket <path>       UNIX socket to listen on [env: PAIM_SOCKET_PATH]");
            eprintln!("  --host <addr>         TCP address to listen on [env: PAIM_CLIENT_ADDR]");
            eprintln!("  --port <port>         TCP port to listen on [env: PAIM_CLIENT_PORT]");
            eprintln!("  --script-dir <dir>    Load script and initial variables [env: PAIM_SCRIPT_PATH]");
            eprintln!("  --var-dir <dir>       Per-request variables files [env: PAIM_VAR_PATH]");
            eprintln!("  --result-dir <dir>    Per-request results files [env: PAIM_RESULT_PATH]");
            eprintln!("  --debug               Send [Debug] messages to the simulator [env: PAIM_DEBUG]");
            process::exit(2);
        }
    };

    skillbridge::logging::init_tracing();

    let config = match load_config(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("error: {e:#}");
    }
    process::exit(BRIDGE_EXIT_CODE);
}

fn parse_args(args: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "--socket" => overrides.socket = Some(PathBuf::from(value()?)),
            "--host" => overrides.host = Some(value()?),
            "--port" => overrides.port = Some(value()?),
            "--script-dir" => overrides.script_dir = Some(PathBuf::from(value()?)),
            "--var-dir" => overrides.var_dir = Some(PathBuf::from(value()?)),
            "--result-dir" => overrides.result_dir = Some(PathBuf::from(value()?)),
            "--debug" => overrides.debug = true,
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(overrides)
}

fn load_config(overrides: ConfigOverrides) -> anyhow::Result<BridgeConfig> {
    let config = BridgeConfig::from_env(overrides).context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(config: &BridgeConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint,
        debug = config.debug,
        "Starting bridge"
    );

    let bridge = Bridge::new(config, JsonFileStore);
    let report = runtime.block_on(bridge.run(text::stdio(), diagnostics::stderr()));

    tracing::info!(
        completed = %report.completed,
        handled = report.handled,
        "Session closed"
    );
    match report.reason {
        CloseReason::Failed(e) => Err(e).context("session failed"),
        CloseReason::Terminated | CloseReason::PeerClosed => Ok(()),
    }
}
