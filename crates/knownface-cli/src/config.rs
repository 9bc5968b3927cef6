use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration: defaults, then an optional TOML file, then `KNOWNFACE_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the gallery file.
    pub gallery_path: PathBuf,
    /// Downscale applied to frames before detection, in (0, 1].
    pub scale_factor: f64,
    /// Maximum embedding distance for a match. Lower is stricter.
    pub tolerance: f32,
    /// Delay between frames in the capture loop.
    pub tick_interval_ms: u64,
    /// Number of frames to discard at startup while exposure settles.
    pub warmup_frames: usize,
    /// Encoder helper argv. Defaults to `python3` running the bundled helper script.
    pub encoder_command: Vec<String>,
    /// If set, the annotated frame is written here after every processed frame.
    pub preview_path: Option<PathBuf>,
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub camera_device: Option<String>,
    pub gallery_path: Option<PathBuf>,
    pub scale_factor: Option<f64>,
    pub tolerance: Option<f32>,
    pub tick_interval_ms: Option<u64>,
    pub warmup_frames: Option<usize>,
    pub encoder_command: Option<Vec<String>>,
    pub preview_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let file = match env("KNOWNFACE_CONFIG") {
            Some(path) => Some(read_file_config(Path::new(&path))?),
            None => {
                let default = config_dir(&env).join("knownface/config.toml");
                if default.exists() {
                    Some(read_file_config(&default)?)
                } else {
                    None
                }
            }
        };
        let config = Self::resolve(file.unwrap_or_default(), env);
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Merge file settings and environment lookups over the defaults.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let gallery_default = data_dir(&env).join("knownface/faces.json");

        Self {
            camera_device: env("KNOWNFACE_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            gallery_path: env("KNOWNFACE_GALLERY_PATH")
                .map(PathBuf::from)
                .or(file.gallery_path)
                .unwrap_or(gallery_default),
            scale_factor: parse_env(&env, "KNOWNFACE_SCALE_FACTOR")
                .or(file.scale_factor)
                .unwrap_or(knownface_core::detector::DEFAULT_SCALE_FACTOR),
            tolerance: parse_env(&env, "KNOWNFACE_TOLERANCE")
                .or(file.tolerance)
                .unwrap_or(knownface_core::matcher::DEFAULT_TOLERANCE),
            tick_interval_ms: parse_env(&env, "KNOWNFACE_TICK_INTERVAL_MS")
                .or(file.tick_interval_ms)
                .unwrap_or(15),
            warmup_frames: parse_env(&env, "KNOWNFACE_WARMUP_FRAMES")
                .or(file.warmup_frames)
                .unwrap_or(4),
            encoder_command: env("KNOWNFACE_ENCODER_CMD")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .or(file.encoder_command)
                .unwrap_or_else(default_encoder_command),
            preview_path: env("KNOWNFACE_PREVIEW_PATH")
                .map(PathBuf::from)
                .or(file.preview_path),
        }
    }

    pub fn session_options(&self) -> knownface_core::SessionOptions {
        knownface_core::SessionOptions {
            scale_factor: self.scale_factor,
            tolerance: self.tolerance,
        }
    }
}

const HELPER_SCRIPT: &str = "face_recognition_helper.py";

/// `python3` running the bundled helper script, located next to the binary.
///
/// Falls back to the source-tree path relative to the working directory.
fn default_encoder_command() -> Vec<String> {
    let script = std::env::current_exe()
        .ok()
        .and_then(|exe| find_helper(&exe))
        .unwrap_or_else(|| Path::new("contrib/encoder").join(HELPER_SCRIPT));
    vec!["python3".to_string(), script.to_string_lossy().into_owned()]
}

/// Look for the helper in `<prefix>/share/knownface/` for an installed
/// `<prefix>/bin/knownface`, then in the source tree for `target/<profile>/knownface`.
fn find_helper(exe: &Path) -> Option<PathBuf> {
    let bin_dir = exe.parent()?;
    [
        bin_dir.join("../share/knownface").join(HELPER_SCRIPT),
        bin_dir.join("../../contrib/encoder").join(HELPER_SCRIPT),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

fn home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".local/share"))
}

fn config_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), env_from(&[("HOME", "/home/ann")]));
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(
            config.gallery_path,
            PathBuf::from("/home/ann/.local/share/knownface/faces.json")
        );
        assert_eq!(config.scale_factor, 0.25);
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.tick_interval_ms, 15);
        assert!(config.preview_path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults_and_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            tolerance = 0.5
            encoder_command = ["/usr/bin/encoder", "--model", "small"]
            "#,
        )
        .unwrap();
        let config = Config::resolve(file, env_from(&[("KNOWNFACE_TOLERANCE", "0.45")]));

        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.encoder_command, vec!["/usr/bin/encoder", "--model", "small"]);
    }

    #[test]
    fn test_env_encoder_command_split() {
        let config = Config::resolve(
            FileConfig::default(),
            env_from(&[("KNOWNFACE_ENCODER_CMD", "python3  helper.py --cnn")]),
        );
        assert_eq!(config.encoder_command, vec!["python3", "helper.py", "--cnn"]);
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let config = Config::resolve(
            FileConfig::default(),
            env_from(&[("KNOWNFACE_SCALE_FACTOR", "quarter"), ("XDG_DATA_HOME", "/data")]),
        );
        assert_eq!(config.scale_factor, 0.25);
        assert_eq!(config.gallery_path, PathBuf::from("/data/knownface/faces.json"));
    }

    #[test]
    fn test_helper_found_in_install_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let share = dir.path().join("share/knownface");
        std::fs::create_dir_all(&share).unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(share.join(HELPER_SCRIPT), "").unwrap();

        let found = find_helper(&dir.path().join("bin/knownface")).unwrap();
        assert!(found.is_file());
        assert!(found.ends_with("share/knownface/face_recognition_helper.py"));
    }

    #[test]
    fn test_helper_found_from_cargo_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let contrib = dir.path().join("contrib/encoder");
        std::fs::create_dir_all(&contrib).unwrap();
        std::fs::create_dir_all(dir.path().join("target/release")).unwrap();
        std::fs::write(contrib.join(HELPER_SCRIPT), "").unwrap();

        let found = find_helper(&dir.path().join("target/release/knownface")).unwrap();
        assert!(found.ends_with("contrib/encoder/face_recognition_helper.py"));
    }

    #[test]
    fn test_helper_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_helper(&dir.path().join("bin/knownface")), None);
    }

    #[test]
    fn test_default_encoder_runs_python_helper() {
        let config = Config::resolve(FileConfig::default(), env_from(&[]));
        assert_eq!(config.encoder_command.len(), 2);
        assert_eq!(config.encoder_command[0], "python3");
        assert!(config.encoder_command[1].ends_with(HELPER_SCRIPT));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tolerence = 0.5\n").unwrap();
        assert!(read_file_config(&path).is_err());
    }
}
