//! Access to the live unit hierarchy.
//!
//! The patcher never owns roster data. It asks a [`UnitHierarchyLoader`] for
//! an immutable [`HierarchySnapshot`] at the start of each run and resolves
//! it into that run's own [`MissionPatchData`](crate::models::MissionPatchData).

use crate::models::{Account, HierarchyError, HierarchySnapshot, Rank, Unit};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;

/// Source of roster snapshots.
///
/// `load_snapshot` is synchronous and may do blocking I/O; call it off the
/// async worker threads or wrap a preloaded [`StaticHierarchyLoader`].
#[cfg_attr(test, mockall::automock)]
pub trait UnitHierarchyLoader: Send + Sync {
    fn load_snapshot(&self) -> Result<Arc<HierarchySnapshot>, HierarchyError>;
}

/// Serves one pre-built snapshot, typically owned by an in-memory cache.
#[derive(Debug, Clone)]
pub struct StaticHierarchyLoader {
    snapshot: Arc<HierarchySnapshot>,
}

impl StaticHierarchyLoader {
    pub fn new(snapshot: HierarchySnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn from_shared(snapshot: Arc<HierarchySnapshot>) -> Self {
        Self { snapshot }
    }
}

impl UnitHierarchyLoader for StaticHierarchyLoader {
    fn load_snapshot(&self) -> Result<Arc<HierarchySnapshot>, HierarchyError> {
        Ok(Arc::clone(&self.snapshot))
    }
}

/// On-disk roster layout.
///
/// ```yaml
/// ranks:
///   - { name: Sergeant, abbreviation: Sgt, game_rank: SERGEANT }
/// accounts:
///   - { id: "100", name: Baker, rank: Sergeant }
/// units:
///   - id: "1-1"
///     name: 1 Section
///     callsign: 1-1-A
///     members: ["100"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterFile {
    #[serde(default)]
    pub ranks: Vec<Rank>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

impl RosterFile {
    pub fn into_snapshot(self) -> Result<HierarchySnapshot, HierarchyError> {
        HierarchySnapshot::new(self.units, self.ranks, self.accounts)
    }
}

/// Reads the roster from a YAML file on every load.
#[derive(Debug, Clone)]
pub struct YamlHierarchyLoader {
    path: Utf8PathBuf,
}

impl YamlHierarchyLoader {
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Read the roster once and serve that snapshot from memory.
    pub fn preload(&self) -> Result<StaticHierarchyLoader, HierarchyError> {
        self.load_snapshot().map(StaticHierarchyLoader::from_shared)
    }
}

impl UnitHierarchyLoader for YamlHierarchyLoader {
    fn load_snapshot(&self) -> Result<Arc<HierarchySnapshot>, HierarchyError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| HierarchyError::Io {
            path: self.path.to_string(),
            source,
        })?;

        let roster: RosterFile =
            serde_yaml_ng::from_str(&contents).map_err(|source| HierarchyError::Yaml {
                path: self.path.to_string(),
                source,
            })?;

        let snapshot = roster.into_snapshot()?;
        tracing::info!(
            "Loaded roster from {}: {} units, {} ranks",
            self.path,
            snapshot.unit_count(),
            snapshot.ranks().len()
        );
        Ok(Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ROSTER: &str = r#"
ranks:
  - { name: Sergeant, abbreviation: Sgt, game_rank: SERGEANT }
  - { name: Private, abbreviation: Pte }
accounts:
  - { id: "1", name: Baker, rank: Sergeant }
  - { id: "2", name: Adams, rank: Private }
units:
  - id: hq
    name: Headquarters
    callsign: HQ
  - id: s1
    name: 1 Section
    callsign: 1-1-A
    parent: hq
    members: ["2", "1"]
    roles:
      1iC: "1"
"#;

    #[test]
    fn test_yaml_loader_reads_roster() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(ROSTER.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let path = Utf8Path::from_path(temp_file.path()).unwrap();
        let snapshot = YamlHierarchyLoader::new(path).load_snapshot().unwrap();

        assert_eq!(snapshot.unit_count(), 2);
        let section = snapshot.find_unit_by_callsign("1-1-A").unwrap();
        assert_eq!(section.parent.as_deref(), Some("hq"));
        assert_eq!(section.roles.get("1iC").map(String::as_str), Some("1"));
        assert_eq!(snapshot.find_account_by_id("1").unwrap().name, "Baker");
        assert_eq!(snapshot.ranks()[1].game_rank, None);
    }

    #[test]
    fn test_yaml_loader_missing_file() {
        let loader = YamlHierarchyLoader::new("does/not/exist.yaml");
        assert!(matches!(loader.load_snapshot(), Err(HierarchyError::Io { .. })));
    }

    #[test]
    fn test_yaml_loader_invalid_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"units: [unclosed").unwrap();
        temp_file.flush().unwrap();

        let path = Utf8Path::from_path(temp_file.path()).unwrap();
        let result = YamlHierarchyLoader::new(path).load_snapshot();
        assert!(matches!(result, Err(HierarchyError::Yaml { .. })));
    }

    #[test]
    fn test_preloaded_roster_outlives_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(ROSTER.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let path = Utf8Path::from_path(temp_file.path()).unwrap().to_path_buf();
        let loader = YamlHierarchyLoader::new(&path).preload().unwrap();
        temp_file.close().unwrap();
        assert!(!path.exists());

        let first = loader.load_snapshot().unwrap();
        let second = loader.load_snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.unit_count(), 2);
    }

    #[test]
    fn test_static_loader_shares_snapshot() {
        let loader = StaticHierarchyLoader::new(HierarchySnapshot::default());
        let first = loader.load_snapshot().unwrap();
        let second = loader.load_snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
