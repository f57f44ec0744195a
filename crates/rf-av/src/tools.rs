//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools the pipelines drive (dvdbackup, ffmpeg) and provides lookup
//! methods for the rest of the workspace. `sh` is looked up too because
//! the concatenation stage is shell-interpreted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["dvdbackup", "ffmpeg", "sh"];

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`rf_core::config::ToolsConfig`] supplies
    /// a custom path **and** that path exists, it is used directly. Otherwise
    /// [`which::which`] is used to locate the tool in `PATH`. Tools that are
    /// not found are silently omitted from the registry.
    pub fn discover(tools_config: &rf_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "dvdbackup" => tools_config.dvdbackup_path.as_deref(),
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                _ => None,
            };

            let resolved = if let Some(p) = custom_path {
                if p.exists() {
                    Some(p.to_path_buf())
                } else {
                    // Custom path does not exist; fall back to PATH.
                    which::which(name).ok()
                }
            } else {
                which::which(name).ok()
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit name → path entries. Intended for
    /// tests that stand in scripts for the real tools.
    pub fn with_tools(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let tools = entries
            .into_iter()
            .map(|(name, path)| {
                (
                    name.clone(),
                    ToolConfig { name, path },
                )
            })
            .collect();
        Self { tools }
    }

    /// Return a reference to the [`ToolConfig`] for the given tool, or an
    /// [`rf_core::Error::Launch`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> rf_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| rf_core::Error::Launch {
            tool: name.to_string(),
            message: format!("{name} not found; is it installed and in PATH?"),
        })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| {
                if let Some(cfg) = self.tools.get(name) {
                    let version = detect_version(name, &cfg.path);
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version,
                        path: Some(cfg.path.clone()),
                    }
                } else {
                    ToolInfo {
                        name: name.to_string(),
                        available: false,
                        version: None,
                        path: None,
                    }
                }
            })
            .collect()
    }

    /// Iterate over all registered tool configs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.tools.iter()
    }
}

/// Run `<tool> --version` (or `-version` for ffmpeg) and return the first
/// line of stdout.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::config::ToolsConfig;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee any tool is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::with_tools([]);
        let result = registry.require("dvdbackup");
        assert!(result.is_err());
    }

    #[test]
    fn check_all_returns_known_tools() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"dvdbackup"));
        assert!(names.contains(&"ffmpeg"));
        assert!(names.contains(&"sh"));
    }

    #[test]
    fn with_tools_resolves() {
        let registry = ToolRegistry::with_tools([(
            "dvdbackup".to_string(),
            PathBuf::from("/bin/true"),
        )]);
        let cfg = registry.require("dvdbackup").unwrap();
        assert_eq!(cfg.path, PathBuf::from("/bin/true"));
    }

    #[test]
    fn missing_override_falls_back_to_path() {
        let mut cfg = ToolsConfig::default();
        cfg.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let registry = ToolRegistry::discover(&cfg);
        // Either PATH has ffmpeg or it is absent entirely; the bogus
        // override must never end up in the registry.
        if let Ok(tool) = registry.require("ffmpeg") {
            assert_ne!(tool.path, PathBuf::from("/nonexistent/ffmpeg"));
        }
    }
}
