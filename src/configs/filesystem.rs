use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileSystemConfig {
    /// Search roots, earliest wins (patch directories go first).
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
    /// Extensions tried, in order, for names given without one.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
        }
    }
}

fn default_roots() -> Vec<String> {
    vec![".".to_string()]
}

fn default_extensions() -> Vec<String> {
    ["ogg", "wav", "mp3", "flac", "m4a"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
