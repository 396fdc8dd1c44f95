use serde::{Deserialize, Serialize};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Prefix for diagnostics the shell writes itself (open/spawn failures).
    pub diagnostic_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            diagnostic_prefix: "minish".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Read size for captured stdout/stderr.
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectConfig {
    /// Mode bits for files created by `>`. Ignored outside Unix.
    pub file_mode: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { file_mode: 0o644 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundConfig {
    /// Give background commands the null device as stdin.
    pub null_stdin: bool,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { null_stdin: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file path, `~` expanded. Empty means stderr.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            file: String::new(),
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    capture: CaptureOverlay,
    #[serde(default)]
    redirect: RedirectOverlay,
    #[serde(default)]
    background: BackgroundOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    diagnostic_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureOverlay {
    chunk_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RedirectOverlay {
    file_mode: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackgroundOverlay {
    null_stdin: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

impl ShellConfig {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/minish/config.toml (if exists)
    ///
    /// Every key present in the user file overrides the default.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/minish/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/minish/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("minish: config parse error: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(v) = overlay.settings.diagnostic_prefix {
            self.settings.diagnostic_prefix = v;
        }
        // A zero chunk size would make every read look like EOF.
        if let Some(v) = overlay.capture.chunk_size.filter(|&n| n > 0) {
            self.capture.chunk_size = v;
        }
        if let Some(v) = overlay.redirect.file_mode {
            self.redirect.file_mode = v;
        }
        if let Some(v) = overlay.background.null_stdin {
            self.background.null_stdin = v;
        }
        if let Some(v) = overlay.logging.level {
            self.logging.level = v;
        }
        if let Some(v) = overlay.logging.file {
            self.logging.file = v;
        }
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
