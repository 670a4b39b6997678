//! Configuration – reads/writes `~/.rover/config.toml`.
//!
//! The API key itself never lives here; the file only names the environment
//! variable that holds it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use rover_runtime::oracle::{DEFAULT_GEMINI_URL, DEFAULT_MODEL};

/// Persisted configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Vision model identifier (e.g. "gemini-2.0-flash").
    #[serde(default = "default_model")]
    pub model: String,

    /// Seconds between decision cycles.  Values below 1.0 are raised to 1.0
    /// by the autopilot.
    #[serde(default = "default_interval")]
    pub interval_secs: f64,

    /// Base URL of the Generative Language API.
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    /// Environment variable that holds the API key.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// JPEG kept fresh by an external capture tool.  Unset → simulated camera.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,

    /// Serial device of the drive base (e.g. `/dev/ttyUSB0`).  Unset →
    /// simulated drive base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_device: Option<PathBuf>,

    /// Seconds between status lines on the console.
    #[serde(default = "default_status_every")]
    pub status_every_secs: u64,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_interval() -> f64 {
    3.0
}
fn default_oracle_url() -> String {
    DEFAULT_GEMINI_URL.to_string()
}
fn default_credential_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_status_every() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            interval_secs: default_interval(),
            oracle_url: default_oracle_url(),
            credential_env: default_credential_env(),
            snapshot_path: None,
            serial_device: None,
            status_every_secs: default_status_every(),
        }
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Effective configuration: the file at [`config_path`] (or defaults when it
/// does not exist) with `ROVER_*` overrides applied.  The second value is
/// `true` when the file was found.
pub fn resolve() -> Result<(Config, bool), String> {
    let loaded = load_from(&config_path())?;
    let found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok((cfg, found))
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_MODEL` | `model` |
/// | `ROVER_INTERVAL` | `interval_secs` |
/// | `ROVER_ORACLE_URL` | `oracle_url` |
/// | `ROVER_SNAPSHOT_PATH` | `snapshot_path` |
/// | `ROVER_SERIAL_DEVICE` | `serial_device` |
///
/// Unparseable numbers are ignored; an empty path clears the field.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("ROVER_INTERVAL")
        && let Ok(secs) = v.trim().parse::<f64>()
    {
        cfg.interval_secs = secs;
    }
    if let Ok(v) = std::env::var("ROVER_ORACLE_URL") {
        cfg.oracle_url = v;
    }
    if let Ok(v) = std::env::var("ROVER_SNAPSHOT_PATH") {
        cfg.snapshot_path = non_empty_path(v);
    }
    if let Ok(v) = std::env::var("ROVER_SERIAL_DEVICE") {
        cfg.serial_device = non_empty_path(v);
    }
}

fn non_empty_path(v: String) -> Option<PathBuf> {
    if v.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(v))
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.model, "gemini-2.0-flash");
        assert_eq!(loaded.interval_secs, 3.0);
        assert_eq!(loaded.credential_env, "GEMINI_API_KEY");
        assert_eq!(loaded.status_every_secs, 10);
        assert!(loaded.snapshot_path.is_none());
        assert!(loaded.serial_device.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_secs = 5.5\nserial_device = \"/dev/ttyUSB0\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.interval_secs, 5.5);
        assert_eq!(loaded.serial_device, Some(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(loaded.model, "gemini-2.0-flash");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_secs = \"soon\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_rover_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".rover"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // The override tests share process-wide env vars, so they run as one test.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: only this test reads or writes ROVER_* variables.
        unsafe {
            std::env::set_var("ROVER_MODEL", "gemini-1.5-pro");
            std::env::set_var("ROVER_INTERVAL", "0.5");
            std::env::set_var("ROVER_ORACLE_URL", "http://proxy:8080");
            std::env::set_var("ROVER_SNAPSHOT_PATH", "/tmp/rover.jpg");
            std::env::set_var("ROVER_SERIAL_DEVICE", "/dev/ttyACM0");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.model, "gemini-1.5-pro");
        assert_eq!(cfg.interval_secs, 0.5);
        assert_eq!(cfg.oracle_url, "http://proxy:8080");
        assert_eq!(cfg.snapshot_path, Some(PathBuf::from("/tmp/rover.jpg")));
        assert_eq!(cfg.serial_device, Some(PathBuf::from("/dev/ttyACM0")));

        unsafe {
            std::env::set_var("ROVER_INTERVAL", "not-a-number");
            std::env::set_var("ROVER_SERIAL_DEVICE", "");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.interval_secs, 3.0);
        assert!(cfg.serial_device.is_none());

        unsafe {
            for var in [
                "ROVER_MODEL",
                "ROVER_INTERVAL",
                "ROVER_ORACLE_URL",
                "ROVER_SNAPSHOT_PATH",
                "ROVER_SERIAL_DEVICE",
            ] {
                std::env::remove_var(var);
            }
        }
    }
}
