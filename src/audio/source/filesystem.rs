//! Overlay filesystem that hands out readable byte streams for audio files.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use symphonia::core::io::MediaSource;
use tracing::{debug, trace};

use crate::{
    common::errors::{AudioError, AudioResult},
    configs::FileSystemConfig,
};

/// An opened audio file, ready for format detection.
pub struct OpenedFile {
    pub reader: Box<dyn MediaSource>,
    /// Lower-case extension of the resolved path, if it has one.
    pub extension: Option<String>,
    pub path: PathBuf,
}

impl std::fmt::Debug for OpenedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedFile")
            .field("extension", &self.extension)
            .field("path", &self.path)
            .finish()
    }
}

pub trait FileSystem: Send + Sync {
    /// Resolve a script-relative name and open it for reading.
    fn open_read(&self, name: &str) -> AudioResult<OpenedFile>;
}

/// Search path overlay over local directories. Earlier roots win.
pub struct LocalFileSystem {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl LocalFileSystem {
    pub fn new(roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self { roots, extensions }
    }

    pub fn from_config(config: &FileSystemConfig) -> Self {
        Self::new(
            config.roots.iter().map(PathBuf::from).collect(),
            config.extensions.clone(),
        )
    }

    /// Find the file `name` refers to, trying the exact name first and then
    /// each configured extension, root by root.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let name = name.replace('\\', "/");
        let rel = Path::new(name.trim_start_matches('/'));

        for root in &self.roots {
            let exact = root.join(rel);
            if exact.is_file() {
                return Some(exact);
            }

            for ext in &self.extensions {
                let candidate = root.join(format!("{}.{}", rel.display(), ext));
                trace!("trying {}", candidate.display());
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl FileSystem for LocalFileSystem {
    fn open_read(&self, name: &str) -> AudioResult<OpenedFile> {
        let path = self
            .resolve(name)
            .ok_or_else(|| AudioError::NotFound(name.to_string()))?;

        let file = File::open(&path).map_err(|source| AudioError::Open {
            name: name.to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        debug!("resolved '{}' to {}", name, path.display());
        Ok(OpenedFile {
            reader: Box::new(file),
            extension,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"RIFF").unwrap();
    }

    #[test]
    fn name_without_extension_tries_configured_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Audio/BGM/town.wav"));
        touch(&dir.path().join("Audio/BGM/town.ogg"));

        let fs = LocalFileSystem::new(
            vec![dir.path().to_path_buf()],
            vec!["ogg".into(), "wav".into()],
        );
        let found = fs.resolve("Audio\\BGM\\town").unwrap();
        assert_eq!(found, dir.path().join("Audio/BGM/town.ogg"));
    }

    #[test]
    fn earlier_root_wins() {
        let patch = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        touch(&patch.path().join("se.wav"));
        touch(&base.path().join("se.wav"));

        let fs = LocalFileSystem::new(
            vec![patch.path().to_path_buf(), base.path().to_path_buf()],
            vec!["wav".into()],
        );
        assert_eq!(fs.resolve("se").unwrap(), patch.path().join("se.wav"));
    }

    #[test]
    fn explicit_extension_resolves_directly() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("jingle.WAV"));

        let fs = LocalFileSystem::new(vec![dir.path().to_path_buf()], vec![".ogg".into()]);
        let opened = fs.open_read("jingle.WAV").unwrap();
        assert_eq!(opened.extension.as_deref(), Some("wav"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(vec![dir.path().to_path_buf()], vec!["ogg".into()]);
        assert!(matches!(fs.open_read("nothing"), Err(AudioError::NotFound(_))));
    }
}
