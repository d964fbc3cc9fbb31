//! Bridge configuration.
//!
//! Built once at startup from the environment the simulator passes down, with
//! command-line overrides, then validated and handed to the session by reference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::transport::Endpoint;
use crate::diagnostics::DEFAULT_DEBUG_DELAY;

pub const ENV_SOCKET_PATH: &str = "PAIM_SOCKET_PATH";
pub const ENV_CLIENT_ADDR: &str = "PAIM_CLIENT_ADDR";
pub const ENV_CLIENT_PORT: &str = "PAIM_CLIENT_PORT";
pub const ENV_SCRIPT_PATH: &str = "PAIM_SCRIPT_PATH";
pub const ENV_VAR_PATH: &str = "PAIM_VAR_PATH";
pub const ENV_RESULT_PATH: &str = "PAIM_RESULT_PATH";
pub const ENV_DEBUG: &str = "PAIM_DEBUG";
pub const ENV_DEBUG_DELAY_MS: &str = "PAIM_DEBUG_DELAY_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{what} directory does not exist: {}", .path.display())]
    MissingDirectory { what: &'static str, path: PathBuf },

    #[error("both a socket path and a host/port were given; choose one transport")]
    Conflicting,
}

/// Values given on the command line; each one wins over its environment variable.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub socket: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub script_dir: Option<PathBuf>,
    pub var_dir: Option<PathBuf>,
    pub result_dir: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Endpoint,
    /// Holds the load script and the user-defined starting variables.
    pub script_dir: PathBuf,
    /// Where per-request variables files are written.
    pub var_dir: PathBuf,
    /// Where the simulator writes per-request results.
    pub result_dir: PathBuf,
    /// Send `[Debug]` diagnostics to the simulator console.
    pub debug: bool,
    pub debug_delay: Duration,
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl BridgeConfig {
    /// Read from the process environment.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let socket = overrides.socket.or_else(|| get(ENV_SOCKET_PATH).map(PathBuf::from));
        let host = overrides.host.or_else(|| get(ENV_CLIENT_ADDR));
        let port = overrides.port.or_else(|| get(ENV_CLIENT_PORT));

        let endpoint = match (socket, host, port) {
            (Some(path), None, None) => Endpoint::Unix(path),
            (Some(_), _, _) => return Err(ConfigError::Conflicting),
            (None, Some(host), Some(port)) => Endpoint::Tcp {
                host,
                port: port
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(port.clone()))?,
            },
            (None, None, Some(_)) => return Err(ConfigError::Missing(ENV_CLIENT_ADDR)),
            (None, _, None) => return Err(ConfigError::Missing(ENV_CLIENT_PORT)),
        };

        let dir = |over: Option<PathBuf>, key: &'static str| {
            over.or_else(|| get(key).map(PathBuf::from))
                .ok_or(ConfigError::Missing(key))
        };
        let script_dir = dir(overrides.script_dir, ENV_SCRIPT_PATH)?;
        let var_dir = dir(overrides.var_dir, ENV_VAR_PATH)?;
        let result_dir = dir(overrides.result_dir, ENV_RESULT_PATH)?;

        let debug = overrides.debug || get(ENV_DEBUG).is_some_and(|v| is_truthy(&v));
        let debug_delay = match get(ENV_DEBUG_DELAY_MS) {
            Some(ms) => Duration::from_millis(ms.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: ENV_DEBUG_DELAY_MS,
                    value: ms.clone(),
                }
            })?),
            None => DEFAULT_DEBUG_DELAY,
        };

        Ok(Self {
            endpoint,
            script_dir,
            var_dir,
            result_dir,
            debug,
            debug_delay,
        })
    }

    /// Check that every directory the bridge will touch exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs: [(&'static str, &Path); 3] = [
            ("script", &self.script_dir),
            ("variables", &self.var_dir),
            ("results", &self.result_dir),
        ];
        for (what, path) in dirs {
            if !path.is_dir() {
                return Err(ConfigError::MissingDirectory {
                    what,
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const DIRS: [(&str, &str); 3] = [
        (ENV_SCRIPT_PATH, "/opt/sim/scripts"),
        (ENV_VAR_PATH, "/opt/sim/vars"),
        (ENV_RESULT_PATH, "/opt/sim/results"),
    ];

    #[test]
    fn tcp_endpoint_from_env() {
        let mut env = DIRS.to_vec();
        env.extend([(ENV_CLIENT_ADDR, "localhost"), (ENV_CLIENT_PORT, "3000")]);

        let config = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap();

        assert_eq!(
            config.endpoint,
            Endpoint::Tcp {
                host: "localhost".to_string(),
                port: 3000
            }
        );
        assert_eq!(config.script_dir, PathBuf::from("/opt/sim/scripts"));
        assert!(!config.debug);
        assert_eq!(config.debug_delay, DEFAULT_DEBUG_DELAY);
    }

    #[test]
    fn socket_override_selects_unix() {
        let config = BridgeConfig::from_lookup(
            lookup(&DIRS),
            ConfigOverrides {
                socket: Some(PathBuf::from("/tmp/pythcad_socket")),
                debug: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.endpoint, Endpoint::Unix(PathBuf::from("/tmp/pythcad_socket")));
        assert!(config.debug);
    }

    #[test]
    fn override_wins_over_env() {
        let mut env = DIRS.to_vec();
        env.extend([(ENV_CLIENT_ADDR, "localhost"), (ENV_CLIENT_PORT, "3000")]);

        let config = BridgeConfig::from_lookup(
            lookup(&env),
            ConfigOverrides {
                port: Some("4000".to_string()),
                var_dir: Some(PathBuf::from("/scratch/vars")),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(config.endpoint, Endpoint::Tcp { port: 4000, .. }));
        assert_eq!(config.var_dir, PathBuf::from("/scratch/vars"));
    }

    #[test]
    fn both_transports_conflict() {
        let mut env = DIRS.to_vec();
        env.extend([
            (ENV_SOCKET_PATH, "/tmp/s"),
            (ENV_CLIENT_ADDR, "localhost"),
            (ENV_CLIENT_PORT, "3000"),
        ]);

        let err = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Conflicting));
    }

    #[test]
    fn missing_port_is_reported_by_name() {
        let mut env = DIRS.to_vec();
        env.push((ENV_CLIENT_ADDR, "localhost"));

        let err = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_CLIENT_PORT)));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut env = DIRS.to_vec();
        env.extend([(ENV_CLIENT_ADDR, "localhost"), (ENV_CLIENT_PORT, "99999")]);

        let err = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(p) if p == "99999"));
    }

    #[test]
    fn missing_result_dir_is_reported() {
        let env = [
            (ENV_SOCKET_PATH, "/tmp/s"),
            (ENV_SCRIPT_PATH, "/a"),
            (ENV_VAR_PATH, "/b"),
        ];

        let err = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_RESULT_PATH)));
    }

    #[test]
    fn debug_flag_and_delay_from_env() {
        let mut env = DIRS.to_vec();
        env.extend([
            (ENV_SOCKET_PATH, "/tmp/s"),
            (ENV_DEBUG, "Yes"),
            (ENV_DEBUG_DELAY_MS, "250"),
        ]);

        let config = BridgeConfig::from_lookup(lookup(&env), ConfigOverrides::default()).unwrap();
        assert!(config.debug);
        assert_eq!(config.debug_delay, Duration::from_millis(250));
    }

    #[test]
    fn validate_checks_directories() {
        let root = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig {
            endpoint: Endpoint::Unix(root.path().join("s.sock")),
            script_dir: root.path().to_path_buf(),
            var_dir: root.path().to_path_buf(),
            result_dir: root.path().to_path_buf(),
            debug: false,
            debug_delay: DEFAULT_DEBUG_DELAY,
        };
        config.validate().unwrap();

        config.result_dir = root.path().join("results");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDirectory { what: "results", .. }));
    }
}
