use crate::models::{
    CallsignNormalization, ItemId, MissionPatchData, MissionTree, PatcherSettings, PlayerId,
    UnitId,
};
use crate::services::report::ReportBuilder;
use std::collections::{HashMap, HashSet};

/// Counts from one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub slots: usize,
    pub assigned: usize,
    pub curators_assigned: usize,
}

/// Assigns roster members to mission slots.
///
/// Slots are visited depth-first in file order. Each slot's callsign is
/// looked up exactly first, then through [`CallsignNormalization`]. A matched
/// unit hands out its members in [`MissionUnit::members`] order, so running
/// again against the same roster produces the same assignment.
///
/// Nothing here fails the run: every slot that cannot be filled is reported
/// as a warning and left empty.
///
/// [`MissionUnit::members`]: crate::models::MissionUnit::members
#[derive(Debug, Clone)]
pub struct SlotMatcher {
    callsign_keys: Vec<String>,
    curator_callsign: String,
    normalization: CallsignNormalization,
    max_curators: usize,
    max_players: usize,
}

impl SlotMatcher {
    pub fn new(settings: &PatcherSettings) -> Self {
        Self {
            callsign_keys: settings.callsign_keys.clone(),
            curator_callsign: settings.curator_callsign.clone(),
            normalization: settings.normalization.clone(),
            max_curators: settings.max_curators,
            max_players: settings.max_players,
        }
    }

    pub fn assign(
        &self,
        tree: &mut MissionTree,
        data: &MissionPatchData,
        reports: &mut ReportBuilder,
    ) -> MatchSummary {
        let lookup = UnitLookup::new(data, &self.normalization);
        let mut state = MatchState {
            cursors: vec![0; data.units.len()],
            used_accounts: HashSet::new(),
        };
        let mut summary = MatchSummary::default();

        tree.clear_assignments();

        for slot in tree.slots() {
            summary.slots += 1;
            let is_curator = tree.item(slot).is_curator();
            let location = tree.describe(slot);

            let Some(callsign) = self.callsign_for(tree, slot, is_curator) else {
                reports.warning(
                    "Slot has no callsign",
                    format!(
                        "{}: no {} property on the slot or its group",
                        location,
                        self.callsign_keys.join("/")
                    ),
                );
                continue;
            };

            if is_curator && summary.curators_assigned >= self.max_curators {
                reports.warning(
                    "Curator limit reached",
                    format!(
                        "{}: left empty, {} curators already assigned",
                        location, self.max_curators
                    ),
                );
                continue;
            }

            if summary.assigned >= self.max_players {
                reports.warning(
                    "Player limit reached",
                    format!(
                        "{}: left empty, {} players already assigned",
                        location, self.max_players
                    ),
                );
                continue;
            }

            let Some(unit) = lookup.find(&callsign, &self.normalization) else {
                reports.warning(
                    "No matching unit",
                    format!("{}: no unit with callsign {}", location, callsign),
                );
                continue;
            };

            let Some(player) = state.next_member(data, unit) else {
                reports.warning(
                    "Slot left empty",
                    format!(
                        "{}: unit {} has no members left",
                        location,
                        data.unit(unit).callsign
                    ),
                );
                continue;
            };

            tracing::debug!(
                "Assigned {} to {} ({})",
                data.player(player).display_name(),
                location,
                callsign
            );
            tree.item_mut(slot).assigned_player = Some(player);
            summary.assigned += 1;
            if is_curator {
                summary.curators_assigned += 1;
            }
        }

        tracing::info!(
            "Matched {} of {} slots ({} curators)",
            summary.assigned,
            summary.slots,
            summary.curators_assigned
        );

        summary
    }

    fn callsign_for(&self, tree: &MissionTree, slot: ItemId, is_curator: bool) -> Option<String> {
        let declared = tree
            .find_inherited_property(slot, &self.callsign_keys)
            .map(|property| property.string_value())
            .filter(|callsign| !callsign.trim().is_empty());

        match declared {
            Some(callsign) => Some(callsign),
            None if is_curator => Some(self.curator_callsign.clone()),
            None => None,
        }
    }
}

/// Callsign indexes over the run's units; the first unit in traversal
/// order wins on duplicates.
struct UnitLookup<'d> {
    exact: HashMap<&'d str, UnitId>,
    normalized: HashMap<String, UnitId>,
}

impl<'d> UnitLookup<'d> {
    fn new(data: &'d MissionPatchData, normalization: &CallsignNormalization) -> Self {
        let mut exact = HashMap::new();
        let mut normalized = HashMap::new();
        for (index, unit) in data.units.iter().enumerate() {
            exact.entry(unit.callsign.as_str()).or_insert(UnitId(index));
            normalized
                .entry(normalization.normalize(&unit.callsign))
                .or_insert(UnitId(index));
        }
        Self { exact, normalized }
    }

    fn find(&self, callsign: &str, normalization: &CallsignNormalization) -> Option<UnitId> {
        self.exact
            .get(callsign)
            .or_else(|| self.normalized.get(&normalization.normalize(callsign)))
            .copied()
    }
}

struct MatchState<'d> {
    cursors: Vec<usize>,
    used_accounts: HashSet<&'d str>,
}

impl<'d> MatchState<'d> {
    /// Next member of `unit` whose account has not been placed yet.
    fn next_member(&mut self, data: &'d MissionPatchData, unit: UnitId) -> Option<PlayerId> {
        let members = &data.unit(unit).members;
        let cursor = &mut self.cursors[unit.0];
        while *cursor < members.len() {
            let player = members[*cursor];
            *cursor += 1;
            if self.used_accounts.insert(data.player(player).account_id.as_str()) {
                return Some(player);
            }
        }
        None
    }
}
