//! Server configuration – reads/writes `~/.avon/config.toml`.

use std::fs;
use std::path::PathBuf;

use avon_core::{DEFAULT_PORT, ServerConfig, SimWorld};
use avon_types::AvonError;
use serde::{Deserialize, Serialize};

/// Persisted configuration stored in `~/.avon/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory static files are served from.
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Log every request at `info`.
    #[serde(default)]
    pub verbose: bool,

    /// Backend identity reported in the `Server` header.
    #[serde(default = "default_backend_name")]
    pub backend_name: String,

    /// Use `wait()` instead of polling with `check()` every tick.
    #[serde(default)]
    pub blocking: bool,

    /// Simulation tick in milliseconds (polling mode).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default)]
    pub world: WorldConfig,
}

/// Simulated world served by the `avon` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub robots: Vec<RobotConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    pub name: String,
    /// `[x, y, yaw]` in the world frame.
    #[serde(default)]
    pub pose: [f64; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fiducial_finders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rangers: Vec<RangerMount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangerMount {
    pub name: String,
    #[serde(default = "default_transducers")]
    pub transducers: usize,
    #[serde(default = "default_samples")]
    pub samples: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_root_dir() -> String {
    ".".to_string()
}
fn default_backend_name() -> String {
    "avon-sim".to_string()
}
fn default_tick_ms() -> u64 {
    10
}
fn default_transducers() -> usize {
    1
}
fn default_samples() -> usize {
    181
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_dir: default_root_dir(),
            verbose: false,
            backend_name: default_backend_name(),
            blocking: false,
            tick_ms: default_tick_ms(),
            world: WorldConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    /// Two robots facing each other; `robot0` carries a laser and a fiducial
    /// finder.
    fn default() -> Self {
        Self {
            robots: vec![
                RobotConfig {
                    name: "robot0".to_string(),
                    pose: [0.0, 0.0, 0.0],
                    fiducial_finders: vec!["fiducial0".to_string()],
                    rangers: vec![RangerMount {
                        name: "laser0".to_string(),
                        transducers: default_transducers(),
                        samples: default_samples(),
                    }],
                },
                RobotConfig {
                    name: "robot1".to_string(),
                    pose: [4.0, 0.0, std::f64::consts::PI],
                    fiducial_finders: Vec::new(),
                    rangers: Vec::new(),
                },
            ],
        }
    }
}

impl Config {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            root_dir: PathBuf::from(&self.root_dir),
            verbose: self.verbose,
            backend_name: self.backend_name.clone(),
            backend_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl WorldConfig {
    /// Build the simulated world.  Robots are added first so every sensor
    /// finds its parent.
    pub fn build(&self) -> Result<SimWorld, AvonError> {
        let mut builder = SimWorld::builder();
        for robot in &self.robots {
            let [x, y, yaw] = robot.pose;
            builder = builder.robot(&robot.name, [x, y, 0.0, 0.0, 0.0, yaw]);
        }
        for robot in &self.robots {
            for ranger in &robot.rangers {
                builder = builder.ranger(&ranger.name, &robot.name, ranger.transducers, ranger.samples);
            }
            for finder in &robot.fiducial_finders {
                builder = builder.fiducial_finder(finder, &robot.name);
            }
        }
        builder.build()
    }
}

/// Return the path to `~/.avon/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".avon").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `AVON_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `AVON_HOST` | `host` |
/// | `AVON_PORT` | `port` |
/// | `AVON_ROOT` | `root_dir` |
/// | `AVON_VERBOSE` | `verbose` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`, keyed by environment variable name.
/// Unparseable ports and flags are ignored.
fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("AVON_HOST") {
        cfg.host = v;
    }
    if let Some(v) = lookup("AVON_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Some(v) = lookup("AVON_ROOT") {
        cfg.root_dir = v;
    }
    if let Some(v) = lookup("AVON_VERBOSE")
        && let Some(verbose) = parse_flag(&v)
    {
        cfg.verbose = verbose;
    }
}

/// Save the config to disk, creating `~/.avon/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
