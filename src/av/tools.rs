//! External tool discovery.
//!
//! The [`ToolRegistry`] locates the CLI tools the mux cache depends on
//! (ffmpeg, ffprobe) on `PATH` once at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Tool names the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, PathBuf>,
}

impl ToolRegistry {
    /// Discover all known tools on `PATH`.
    pub fn discover() -> Self {
        let mut tools = HashMap::new();
        for &name in KNOWN_TOOLS {
            match which::which(name) {
                Ok(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "discovered tool");
                    tools.insert(name, path);
                }
                Err(_) => tracing::debug!(tool = name, "tool not found on PATH"),
            }
        }

        Self { tools }
    }

    /// A registry with explicit tool paths, for tests and overrides.
    pub fn with_tools(tools: HashMap<&'static str, PathBuf>) -> Self {
        Self { tools }
    }

    /// Whether the named tool was found.
    pub fn available(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The path of the named tool, failing when it was not discovered.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::tool(name, "not found on PATH"))
    }
}
