use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Top-level configuration from `Patcher.yaml`.
///
/// The file contains a single `patcher` section so that environment overrides
/// read as `SQMPATCH_PATCHER__MAX_CURATORS=4`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatcherConfig {
    #[serde(default)]
    pub patcher: PatcherSettings,
}

/// Settings consumed by the patching pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatcherSettings {
    /// Directory containing one sub-directory per mission.
    #[serde(default = "default_missions_dir")]
    pub missions_dir: Utf8PathBuf,

    /// Name of the mission description file inside a mission directory.
    #[serde(default = "default_mission_file")]
    pub mission_file: String,

    /// Roster file read by the YAML hierarchy loader.
    #[serde(default = "default_roster_file")]
    pub roster_file: Utf8PathBuf,

    #[serde(default = "default_max_curators")]
    pub max_curators: usize,

    #[serde(default = "default_max_players")]
    pub max_players: usize,

    /// Property keys that carry a callsign, checked in order.
    #[serde(default = "default_callsign_keys")]
    pub callsign_keys: Vec<String>,

    /// Callsign used for curator slots that do not declare one.
    #[serde(default = "default_curator_callsign")]
    pub curator_callsign: String,

    #[serde(default)]
    pub normalization: CallsignNormalization,

    #[serde(default)]
    pub slot_markers: SlotMarkers,
}

impl Default for PatcherSettings {
    fn default() -> Self {
        Self {
            missions_dir: default_missions_dir(),
            mission_file: default_mission_file(),
            roster_file: default_roster_file(),
            max_curators: default_max_curators(),
            max_players: default_max_players(),
            callsign_keys: default_callsign_keys(),
            curator_callsign: default_curator_callsign(),
            normalization: CallsignNormalization::default(),
            slot_markers: SlotMarkers::default(),
        }
    }
}

fn default_missions_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("missions")
}

fn default_mission_file() -> String {
    "mission.sqm".to_string()
}

fn default_roster_file() -> Utf8PathBuf {
    Utf8PathBuf::from("roster.yaml")
}

fn default_max_curators() -> usize {
    5
}

fn default_max_players() -> usize {
    120
}

fn default_callsign_keys() -> Vec<String> {
    vec!["callsign".to_string()]
}

fn default_curator_callsign() -> String {
    "Curator".to_string()
}

/// Normalisation applied to callsigns when an exact match fails.
///
/// Both sides of the comparison go through [`CallsignNormalization::normalize`],
/// so `"1-1-a "` and `"1-1-A"` compare equal under the defaults while
/// `"1-1-A"` and `"11A"` only do when `ignore_punctuation` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsignNormalization {
    #[serde(default = "default_true")]
    pub case_insensitive: bool,

    #[serde(default = "default_true")]
    pub ignore_whitespace: bool,

    #[serde(default)]
    pub ignore_punctuation: bool,
}

impl Default for CallsignNormalization {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            ignore_whitespace: true,
            ignore_punctuation: false,
        }
    }
}

impl CallsignNormalization {
    pub fn normalize(&self, callsign: &str) -> String {
        let mut normalized = String::with_capacity(callsign.len());
        for c in callsign.trim().chars() {
            if self.ignore_whitespace && c.is_whitespace() {
                continue;
            }
            if self.ignore_punctuation && c.is_ascii_punctuation() {
                continue;
            }
            if self.case_insensitive {
                normalized.extend(c.to_lowercase());
            } else {
                normalized.push(c);
            }
        }
        normalized
    }
}

fn default_true() -> bool {
    true
}

/// Marker properties used by the default slot predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMarkers {
    /// Any of these keys set to `1` marks an object as playable.
    #[serde(default = "default_playable_keys")]
    pub playable_keys: Vec<String>,

    /// `dataType` values that can carry a playable slot.
    #[serde(default = "default_playable_data_types")]
    pub playable_data_types: Vec<String>,

    /// `type` values identifying a curator (game master) module.
    #[serde(default = "default_curator_types")]
    pub curator_types: Vec<String>,
}

impl Default for SlotMarkers {
    fn default() -> Self {
        Self {
            playable_keys: default_playable_keys(),
            playable_data_types: default_playable_data_types(),
            curator_types: default_curator_types(),
        }
    }
}

fn default_playable_keys() -> Vec<String> {
    vec!["isPlayable".to_string(), "isPlayer".to_string()]
}

fn default_playable_data_types() -> Vec<String> {
    vec!["Object".to_string()]
}

fn default_curator_types() -> Vec<String> {
    vec!["ModuleCurator_F".to_string()]
}
