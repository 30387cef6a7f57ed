use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

pub const CONFIG_PATH_ENV: &str = "ROOMWATCH_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Floor {
    pub name: String,
    pub rooms: Vec<String>,
}

impl Floor {
    /// `count` consecutive room numbers starting at `first`.
    pub fn numbered(name: impl Into<String>, first: u32, count: u32) -> Self {
        Self {
            name: name.into(),
            rooms: (first..first + count).map(|n| n.to_string()).collect(),
        }
    }
}

/// Building layout, store locations and the room → badge binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildingConfig {
    pub name: String,
    pub rooms_path: String,
    pub scans_path: String,
    pub floors: Vec<Floor>,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            name: "Old".into(),
            rooms_path: "OB_Rooms_Information".into(),
            scans_path: "RFID_Cards".into(),
            floors: vec![
                Floor::numbered("1st Floor", 101, 10),
                Floor::numbered("2nd Floor", 201, 10),
                Floor::numbered("3rd Floor", 301, 10),
            ],
            bindings: BTreeMap::from([("105".to_string(), "14:d3:95:a7".to_string())]),
        }
    }
}

impl BuildingConfig {
    pub fn badge_for(&self, room: &str) -> Option<&str> {
        self.bindings.get(room).map(String::as_str)
    }

    pub fn floor_of(&self, room: &str) -> Option<&Floor> {
        self.floors
            .iter()
            .find(|floor| floor.rooms.iter().any(|r| r == room))
    }

    pub fn has_room(&self, room: &str) -> bool {
        self.floor_of(room).is_some()
    }

    /// Points `room` at `badge`, or unbinds it. A badge serves one room, so
    /// binding it here releases it from wherever it was before.
    pub fn bind(&mut self, room: &str, badge: Option<String>) -> Result<()> {
        if !self.has_room(room) {
            return Err(anyhow!("room {room} is not part of building {}", self.name));
        }
        match badge {
            Some(badge) => {
                self.bindings.retain(|_, bound| *bound != badge);
                self.bindings.insert(room.to_string(), badge);
            }
            None => {
                self.bindings.remove(room);
            }
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<BuildingConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read building config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Building config at {} is invalid, using defaults: {err}", path.display());
                BuildingConfig::default()
            })
        } else {
            BuildingConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Uses `ROOMWATCH_CONFIG` when set, otherwise `building.json` in `data_dir`.
    pub fn resolve_path(data_dir: &Path) -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("building.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn building(&self) -> BuildingConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_binding(&self, room: &str, badge: Option<String>) -> Result<BuildingConfig> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("building config lock poisoned"))?;
        let mut updated = guard.clone();
        updated.bind(room, badge)?;
        self.persist(&updated)?;
        *guard = updated.clone();
        Ok(updated)
    }

    fn persist(&self, data: &BuildingConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write building config to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_building_matches_old_building() {
        let config = BuildingConfig::default();

        assert_eq!(config.floors.len(), 3);
        assert_eq!(config.floors[0].rooms.first().map(String::as_str), Some("101"));
        assert_eq!(config.floors[2].rooms.last().map(String::as_str), Some("310"));
        assert_eq!(config.badge_for("105"), Some("14:d3:95:a7"));
        assert_eq!(config.badge_for("106"), None);
        assert_eq!(config.floor_of("205").map(|f| f.name.as_str()), Some("2nd Floor"));
    }

    #[test]
    fn binding_a_badge_moves_it() {
        let mut config = BuildingConfig::default();

        config.bind("201", Some("14:d3:95:a7".into())).unwrap();

        assert_eq!(config.badge_for("201"), Some("14:d3:95:a7"));
        assert_eq!(config.badge_for("105"), None);

        config.bind("201", None).unwrap();
        assert!(config.bindings.is_empty());
    }

    #[test]
    fn unknown_rooms_cannot_be_bound() {
        let mut config = BuildingConfig::default();
        assert!(config.bind("999", Some("x".into())).is_err());
    }

    #[test]
    fn bindings_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("building.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_binding("110", Some("aa:bb:cc:dd".into())).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.building().badge_for("110"), Some("aa:bb:cc:dd"));
        assert_eq!(reloaded.building().badge_for("105"), Some("14:d3:95:a7"));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("building.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.building(), BuildingConfig::default());
    }
}
