//! Compiler configuration.
//!
//! Loaded from TOML, then adjusted from the environment:
//!
//! - `NVRTC_JIT_LIBRARY`: path tried before the configured candidates
//! - `NVRTC_JIT_MAX_TEXT`: ceiling for native-reported log/PTX sizes

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::MAX_NATIVE_TEXT;
use crate::error::{CompilerError, Result};

pub const ENV_LIBRARY: &str = "NVRTC_JIT_LIBRARY";
pub const ENV_MAX_TEXT: &str = "NVRTC_JIT_MAX_TEXT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Id the NVRTC library is registered under with the resolver.
    pub library: String,

    /// Shared-library paths tried in order.
    pub library_paths: Vec<String>,

    /// Upper bound on sizes reported by NVRTC before a buffer is allocated.
    pub max_native_text: usize,

    /// Options placed ahead of the per-call options on every compile.
    pub default_options: Vec<String>,

    /// Hold one lock across each whole compile.
    pub serialize_compilations: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            library: "nvrtc".to_string(),
            library_paths: default_library_paths(),
            max_native_text: MAX_NATIVE_TEXT,
            default_options: Vec::new(),
            serialize_compilations: false,
        }
    }
}

fn default_library_paths() -> Vec<String> {
    #[cfg(target_os = "windows")]
    let names: &[&str] = &[
        "nvrtc64_120_0.dll",
        "nvrtc64_112_0.dll",
        "nvrtc64_111_0.dll",
        "nvrtc64_110_0.dll",
        "nvrtc64_102_0.dll",
    ];

    #[cfg(not(target_os = "windows"))]
    let names: &[&str] = &[
        "libnvrtc.so",
        "libnvrtc.so.12",
        "libnvrtc.so.11.2",
        "libnvrtc.so.11.1",
        "libnvrtc.so.11.0",
        "/usr/local/cuda/lib64/libnvrtc.so",
    ];

    names.iter().map(|name| name.to_string()).collect()
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| CompilerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `NVRTC_JIT_LIBRARY` and `NVRTC_JIT_MAX_TEXT` if set.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(
            std::env::var(ENV_LIBRARY).ok().as_deref(),
            std::env::var(ENV_MAX_TEXT).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, library: Option<&str>, max_text: Option<&str>) -> Result<Self> {
        if let Some(path) = library.filter(|p| !p.is_empty()) {
            self.library_paths.insert(0, path.to_string());
        }
        if let Some(raw) = max_text {
            self.max_native_text = raw
                .trim()
                .parse()
                .map_err(|e| CompilerError::Config(format!("{}={}: {}", ENV_MAX_TEXT, raw, e)))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.library.is_empty() {
            return Err(CompilerError::Config("library id must not be empty".into()));
        }
        if self.library_paths.is_empty() {
            return Err(CompilerError::Config("at least one library path is required".into()));
        }
        if self.max_native_text == 0 || self.max_native_text > i64::MAX as usize {
            return Err(CompilerError::Config(format!(
                "max_native_text must be between 1 and {}, got {}",
                i64::MAX,
                self.max_native_text
            )));
        }
        Ok(())
    }
}
