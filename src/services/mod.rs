//! Services module - The mission patching pipeline.
//!
//! Each step of a patching run lives in its own service. None of them keep
//! state between runs, so a single [`MissionPatchingService`] can patch
//! several missions at once.
//!
//! # Components
//!
//! - [`SqmTextReader`] / [`SqmDocument`]: loads a `mission.sqm` as raw lines,
//!   keeping terminators and any byte order mark so untouched lines are
//!   written back byte-identical.
//! - [`EntityParser`]: parses the class/brace format and builds the
//!   [`MissionTree`](crate::models::MissionTree) of groups, units and logic
//!   modules with their source line ranges. Slots are classified through a
//!   pluggable [`SlotPredicate`].
//! - [`UnitHierarchyLoader`]: supplies an immutable roster snapshot per run.
//! - [`SlotMatcher`]: assigns roster members to slots by callsign, honouring
//!   the curator and player caps.
//! - [`MissionPatcher`]: rewrites the `description`, `rank` and `type` lines
//!   of matched slots and nothing else.
//! - [`ReportBuilder`]: collects warnings and errors in detection order.
//!
//! # Usage Example
//!
//! ```ignore
//! use sqmpatch::services::{MissionPatchingService, YamlHierarchyLoader};
//! use std::sync::Arc;
//!
//! let loader = Arc::new(YamlHierarchyLoader::new("Patcher Data/roster.yaml"));
//! let service = MissionPatchingService::new(settings, loader);
//!
//! let result = service.patch_mission_file("op_thunder.Altis").await?;
//! println!("{}", result.summary());
//! ```

pub mod hierarchy;
pub mod matcher;
pub mod parser;
pub mod patcher;
pub mod patching;
pub mod reader;
pub mod report;

pub use hierarchy::{RosterFile, StaticHierarchyLoader, UnitHierarchyLoader, YamlHierarchyLoader};
pub use matcher::{MatchSummary, SlotMatcher};
pub use parser::{
    ClassNode, EntityParser, MarkerSlotPredicate, ParsedMission, SlotPredicate, SqmParseError,
    parse_class_tree,
};
pub use patcher::{MissionPatcher, PatchedDocument, RewriteError};
pub use patching::{MissionLocation, MissionPatchingService, MissionRun, PatchError};
pub use reader::{SqmDocument, SqmTextReader};
pub use report::ReportBuilder;
