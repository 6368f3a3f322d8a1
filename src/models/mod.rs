//! Data models for the mission patcher.
//!
//! - [`PatcherConfig`] / [`PatcherSettings`]: settings loaded from `Patcher.yaml`
//! - [`MissionTree`]: arena of parsed `Entities` blocks and their items
//! - [`HierarchySnapshot`]: read-only roster (units, ranks, accounts)
//! - [`MissionPatchData`]: per-run resolution of the roster used for matching
//! - [`MissionPatchingResult`]: player count, success flag and ordered reports

pub mod config;
pub mod mission;
pub mod report;
pub mod roster;

pub use config::{CallsignNormalization, PatcherConfig, PatcherSettings, SlotMarkers};
pub use mission::{
    EntityId, ItemId, LineRange, Mission, MissionEntity, MissionEntityItem, MissionTree, SlotKind,
    SqmProperty,
};
pub use report::{MissionPatchingReport, MissionPatchingResult};
pub use roster::{
    Account, HierarchyError, HierarchySnapshot, MissionPatchData, MissionPlayer, MissionUnit,
    PlayerId, Rank, Unit, UnitId,
};
