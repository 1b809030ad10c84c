use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration: defaults, then an optional TOML file, then
/// `REDWATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Encoding store written by `rebuild` and read by recognition.
    pub encodings_path: PathBuf,
    /// Red list, one name per line. Missing file means an empty list.
    pub red_list_path: PathBuf,
    /// Dataset root: one sub-directory of photos per person.
    pub dataset_dir: PathBuf,
    /// Maximum embedding distance accepted as a match, in [0.0, 1.0].
    pub tolerance: f32,
    /// V4L2 device path.
    pub camera_device: String,
    /// Requested capture width.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
    /// Webcam frames wider than this are shrunk before recognition.
    pub max_width: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_data_dir().join("models"),
            encodings_path: PathBuf::from("face_encodings.json"),
            red_list_path: PathBuf::from("red_list.txt"),
            dataset_dir: PathBuf::from("train"),
            tolerance: 0.5,
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            max_width: 600,
        }
    }
}

impl Config {
    /// Load from `path`, or `REDWATCH_CONFIG` when no path is given, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("REDWATCH_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config = Self::from_toml(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `REDWATCH_*` variables. Unparseable numbers are
    /// ignored with a warning.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("REDWATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDWATCH_ENCODINGS_PATH") {
            self.encodings_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDWATCH_RED_LIST_PATH") {
            self.red_list_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDWATCH_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDWATCH_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        env_parse(&lookup, "REDWATCH_TOLERANCE", &mut self.tolerance);
        env_parse(&lookup, "REDWATCH_FRAME_WIDTH", &mut self.frame_width);
        env_parse(&lookup, "REDWATCH_FRAME_HEIGHT", &mut self.frame_height);
        env_parse(&lookup, "REDWATCH_MAX_WIDTH", &mut self.max_width);
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("redwatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.max_width, 600);
        assert_eq!(config.frame_width, 640);
        assert_eq!(config.frame_height, 480);
        assert_eq!(config.red_list_path, PathBuf::from("red_list.txt"));
        assert!(config.model_dir.ends_with("redwatch/models"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("tolerance = 0.42\ncamera_device = \"/dev/video3\"\n").unwrap();
        assert_eq!(config.tolerance, 0.42);
        assert_eq!(config.camera_device, "/dev/video3");
        assert_eq!(config.max_width, 600);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        assert!(Config::from_toml("tolerence = 0.3").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REDWATCH_TOLERANCE", "0.3"),
            ("REDWATCH_ENCODINGS_PATH", "/data/enc.json"),
            ("REDWATCH_MAX_WIDTH", "800"),
            ("REDWATCH_FRAME_WIDTH", "wide"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.tolerance, 0.3);
        assert_eq!(config.encodings_path, PathBuf::from("/data/enc.json"));
        assert_eq!(config.max_width, 800);
        assert_eq!(config.frame_width, 640, "unparseable value is ignored");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redwatch.toml");
        std::fs::write(&path, "dataset_dir = \"photos\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("photos"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
