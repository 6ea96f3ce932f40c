// Filesystem-backed storage for uploaded merge configuration files

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use merge_control_types::{sys_info, ControlError, ControlResult};

const CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Flat directory of configuration files addressed by file name.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Open the store, creating its directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> ControlResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under `name`, replacing any existing file.
    pub fn save(&self, name: &str, bytes: &[u8]) -> ControlResult<PathBuf> {
        let path = self.path_for(name)?;
        // The directory may have been removed since the store was opened
        fs::create_dir_all(&self.root)?;
        fs::write(&path, bytes)?;
        sys_info!("[CONFIGS] Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Names of stored files that look like configuration documents, sorted.
    pub fn list(&self) -> ControlResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_config_name(name))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> ControlResult<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path)?;
        sys_info!("[CONFIGS] Deleted {}", path.display());
        Ok(())
    }

    /// Path of a stored file, or `NotFound`.
    pub fn resolve(&self, name: &str) -> ControlResult<PathBuf> {
        let path = self.path_for(name)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(ControlError::not_found(format!("File not found: {name}")))
        }
    }

    fn path_for(&self, name: &str) -> ControlResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn is_config_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
}

/// Names must stay inside the store directory.
fn validate_name(name: &str) -> ControlResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(ControlError::invalid_request(format!("Invalid file name: {name:?}")));
    }
    Ok(())
}
