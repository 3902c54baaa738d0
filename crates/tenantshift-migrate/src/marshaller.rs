//! On-disk service-instance records and app manifests.
//!
//! Layout under the export root:
//!
//! ```text
//! <org>/<space>/<instance>.yml
//! <org>/<space>/apps/<app>.yml
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tenantshift_core::{Manifest, ServiceInstance};

use crate::error::{MigrateError, Result};

/// Extensions recognized as service-instance records.
pub const RECORD_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

const APPS_DIR: &str = "apps";

/// Reads and writes migration files.
pub trait FileMarshaller: Send + Sync {
    /// Writes an instance record; returns its path.
    fn save_instance(&self, org: &str, space: &str, instance: &ServiceInstance) -> Result<PathBuf>;
    /// Reads an instance record.
    fn load_instance(&self, path: &Path) -> Result<ServiceInstance>;
    /// Writes an app manifest; returns its path.
    fn save_manifest(&self, org: &str, space: &str, app: &str, manifest: &Manifest) -> Result<PathBuf>;
    /// Instance records of one space, sorted.
    fn list_instances(&self, org: &str, space: &str) -> Result<Vec<PathBuf>>;
    /// Every exported `(org, space)` pair, sorted.
    fn list_spaces(&self) -> Result<Vec<(String, String)>>;
}

/// YAML files under a root directory. Loads JSON records too.
#[derive(Debug, Clone)]
pub struct YamlMarshaller {
    root: PathBuf,
}

impl YamlMarshaller {
    /// Marshaller rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn space_dir(&self, org: &str, space: &str) -> PathBuf {
        self.root.join(file_name(org)).join(file_name(space))
    }

    fn write(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MigrateError::io(parent, e))?;
        }
        fs::write(path, contents).map_err(|e| MigrateError::io(path, e))
    }
}

impl FileMarshaller for YamlMarshaller {
    fn save_instance(&self, org: &str, space: &str, instance: &ServiceInstance) -> Result<PathBuf> {
        let path = self
            .space_dir(org, space)
            .join(format!("{}.yml", file_name(&instance.name)));
        Self::write(&path, &serde_yaml::to_string(instance)?)?;
        Ok(path)
    }

    fn load_instance(&self, path: &Path) -> Result<ServiceInstance> {
        let contents = fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&contents)?),
            _ => Ok(serde_yaml::from_str(&contents)?),
        }
    }

    fn save_manifest(&self, org: &str, space: &str, app: &str, manifest: &Manifest) -> Result<PathBuf> {
        let path = self
            .space_dir(org, space)
            .join(APPS_DIR)
            .join(format!("{}.yml", file_name(app)));
        Self::write(&path, &serde_yaml::to_string(manifest)?)?;
        Ok(path)
    }

    fn list_instances(&self, org: &str, space: &str) -> Result<Vec<PathBuf>> {
        let dir = self.space_dir(org, space);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut records: Vec<PathBuf> = read_dir(&dir)?
            .into_iter()
            .filter(|p| p.is_file() && is_record(p))
            .collect();
        records.sort();
        Ok(records)
    }

    fn list_spaces(&self) -> Result<Vec<(String, String)>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut spaces = Vec::new();
        for org_dir in read_dir(&self.root)?.into_iter().filter(|p| p.is_dir()) {
            let Some(org) = dir_name(&org_dir) else { continue };
            for space_dir in read_dir(&org_dir)?.into_iter().filter(|p| p.is_dir()) {
                if let Some(space) = dir_name(&space_dir) {
                    spaces.push((org.clone(), space));
                }
            }
        }
        spaces.sort();
        Ok(spaces)
    }
}

/// Whether a path has a record extension.
pub fn is_record(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RECORD_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| MigrateError::io(dir, e))?;
    entries
        .map(|entry| entry.map(|e| e.path()).map_err(|e| MigrateError::io(dir, e)))
        .collect()
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn file_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}
