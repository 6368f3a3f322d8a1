//! Organisational roster: the live unit hierarchy and the per-run view of it
//! used for slot matching.
//!
//! [`HierarchySnapshot`] is the read-only input owned by the personnel side.
//! [`MissionPatchData`] is rebuilt from a snapshot for every patch run, so
//! concurrent runs never share mutable matching state.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A unit of the organisation (section, platoon, company...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub callsign: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Account ids in the unit's declared order.
    #[serde(default)]
    pub members: Vec<String>,
    /// Role name to account id, in role order.
    #[serde(default)]
    pub roles: IndexMap<String, String>,
    /// Object class the unit's members spawn as, if the unit overrides it.
    #[serde(default)]
    pub object_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub name: String,
    pub abbreviation: String,
    /// In-game rank (`PRIVATE`, `CORPORAL`, `SERGEANT`...).
    #[serde(default)]
    pub game_rank: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rank: Option<String>,
}

/// Errors raised while building or loading a hierarchy snapshot.
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(String),

    #[error("Unit {unit} references unknown parent {parent}")]
    UnknownParent { unit: String, parent: String },

    #[error("Unit hierarchy contains a cycle through {0}")]
    Cycle(String),

    #[error("Failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse roster {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// Immutable snapshot of units, ranks and accounts.
#[derive(Debug, Clone, Default)]
pub struct HierarchySnapshot {
    units: Vec<Unit>,
    /// Ranks, most senior first.
    ranks: Vec<Rank>,
    accounts: HashMap<String, Account>,
    unit_index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl HierarchySnapshot {
    /// Build a snapshot, validating the parent links.
    ///
    /// Units keep their declared order; a unit's children are ordered by
    /// their position in `units`.
    pub fn new(
        units: Vec<Unit>,
        ranks: Vec<Rank>,
        accounts: Vec<Account>,
    ) -> Result<Self, HierarchyError> {
        let mut unit_index = HashMap::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            if unit_index.insert(unit.id.clone(), index).is_some() {
                return Err(HierarchyError::DuplicateUnit(unit.id.clone()));
            }
        }

        let mut children = vec![Vec::new(); units.len()];
        let mut roots = Vec::new();
        for (index, unit) in units.iter().enumerate() {
            match &unit.parent {
                Some(parent) => {
                    let parent_index = *unit_index.get(parent).ok_or_else(|| {
                        HierarchyError::UnknownParent {
                            unit: unit.id.clone(),
                            parent: parent.clone(),
                        }
                    })?;
                    children[parent_index].push(index);
                }
                None => roots.push(index),
            }
        }

        let snapshot = Self {
            units,
            ranks,
            accounts: accounts
                .into_iter()
                .map(|account| (account.id.clone(), account))
                .collect(),
            unit_index,
            children,
            roots,
        };

        // Every unit must be reachable from a root, otherwise its parent
        // chain loops back on itself.
        let reachable = snapshot.traversal_indices();
        if reachable.len() != snapshot.units.len() {
            let seen: HashSet<usize> = reachable.into_iter().collect();
            let unit = (0..snapshot.units.len())
                .find(|index| !seen.contains(index))
                .map(|index| snapshot.units[index].id.clone())
                .unwrap_or_default();
            return Err(HierarchyError::Cycle(unit));
        }

        Ok(snapshot)
    }

    pub fn find_unit_by_id(&self, id: &str) -> Option<&Unit> {
        self.unit_index.get(id).map(|&index| &self.units[index])
    }

    /// Exact callsign lookup; the first unit in traversal order wins.
    pub fn find_unit_by_callsign(&self, callsign: &str) -> Option<&Unit> {
        self.units_in_traversal_order()
            .into_iter()
            .find(|unit| unit.callsign == callsign)
    }

    pub fn find_account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }

    /// Position of a rank in the seniority list (0 = most senior).
    pub fn rank_seniority(&self, rank_name: &str) -> Option<usize> {
        self.ranks.iter().position(|rank| rank.name == rank_name)
    }

    pub fn parent_of(&self, unit: &Unit) -> Option<&Unit> {
        unit.parent
            .as_deref()
            .and_then(|parent| self.find_unit_by_id(parent))
    }

    pub fn children_of(&self, unit: &Unit) -> Vec<&Unit> {
        self.unit_index
            .get(&unit.id)
            .map(|&index| {
                self.children[index]
                    .iter()
                    .map(|&child| &self.units[child])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Depth-first order from the roots, children in declared order.
    pub fn units_in_traversal_order(&self) -> Vec<&Unit> {
        self.traversal_indices()
            .into_iter()
            .map(|index| &self.units[index])
            .collect()
    }

    fn traversal_indices(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.units.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.children[index].iter().rev());
        }
        order
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

/// Index of a [`MissionPlayer`] inside its [`MissionPatchData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub(crate) usize);

/// Index of a [`MissionUnit`] inside its [`MissionPatchData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub(crate) usize);

/// A roster member eligible for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionPlayer {
    pub name: String,
    pub object_class: Option<String>,
    pub rank: Option<Rank>,
    pub unit: UnitId,
    /// Id of the originating account; the account itself stays with the roster.
    pub account_id: String,
}

impl MissionPlayer {
    /// Slot label such as `Sgt.Smith`.
    pub fn display_name(&self) -> String {
        match &self.rank {
            Some(rank) if !rank.abbreviation.is_empty() => {
                format!("{}.{}", rank.abbreviation, self.name)
            }
            _ => self.name.clone(),
        }
    }
}

/// The mission-side view of a roster unit.
#[derive(Debug, Clone)]
pub struct MissionUnit {
    pub callsign: String,
    /// Id of the roster unit this was built from.
    pub source_unit: String,
    /// Members in hand-out order: rank seniority, then declared order.
    pub members: Vec<PlayerId>,
    /// Role name to the player holding it.
    pub roles: IndexMap<String, PlayerId>,
}

impl MissionUnit {
    pub fn role_of(&self, player: PlayerId) -> Option<&str> {
        self.roles
            .iter()
            .find(|&(_, &holder)| holder == player)
            .map(|(role, _)| role.as_str())
    }
}

/// Per-run aggregate handed to the slot matcher.
#[derive(Debug, Clone, Default)]
pub struct MissionPatchData {
    pub units: Vec<MissionUnit>,
    pub players: Vec<MissionPlayer>,
    pub ranks: Vec<Rank>,
}

impl MissionPatchData {
    /// Resolve a snapshot into ordered units and players.
    ///
    /// Members whose account is missing from the snapshot are skipped.
    pub fn build(snapshot: &HierarchySnapshot) -> Self {
        let mut data = Self {
            ranks: snapshot.ranks().to_vec(),
            ..Self::default()
        };

        for unit in snapshot.units_in_traversal_order() {
            let unit_id = UnitId(data.units.len());
            let mut members: Vec<(usize, PlayerId)> = Vec::with_capacity(unit.members.len());
            let mut by_account: HashMap<&str, PlayerId> = HashMap::new();

            for account_id in &unit.members {
                let Some(account) = snapshot.find_account_by_id(account_id) else {
                    tracing::warn!(
                        "Unit {} lists unknown account {}, skipping member",
                        unit.callsign,
                        account_id
                    );
                    continue;
                };
                if by_account.contains_key(account_id.as_str()) {
                    continue;
                }

                let rank = account.rank.as_deref().and_then(|name| {
                    snapshot
                        .rank_seniority(name)
                        .map(|position| (position, snapshot.ranks()[position].clone()))
                });
                let seniority = rank.as_ref().map_or(usize::MAX, |(position, _)| *position);

                let player_id = PlayerId(data.players.len());
                data.players.push(MissionPlayer {
                    name: account.name.clone(),
                    object_class: unit.object_class.clone(),
                    rank: rank.map(|(_, rank)| rank),
                    unit: unit_id,
                    account_id: account.id.clone(),
                });
                by_account.insert(account_id.as_str(), player_id);
                members.push((seniority, player_id));
            }

            // Stable sort keeps declared order among equal ranks.
            members.sort_by_key(|(seniority, _)| *seniority);

            let roles = unit
                .roles
                .iter()
                .filter_map(|(role, account_id)| {
                    by_account
                        .get(account_id.as_str())
                        .map(|&player| (role.clone(), player))
                })
                .collect();

            data.units.push(MissionUnit {
                callsign: unit.callsign.clone(),
                source_unit: unit.id.clone(),
                members: members.into_iter().map(|(_, player)| player).collect(),
                roles,
            });
        }

        tracing::debug!(
            "Built mission patch data: {} units, {} players, {} ranks",
            data.units.len(),
            data.players.len(),
            data.ranks.len()
        );

        data
    }

    pub fn unit(&self, id: UnitId) -> &MissionUnit {
        &self.units[id.0]
    }

    pub fn player(&self, id: PlayerId) -> &MissionPlayer {
        &self.players[id.0]
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_traversal_order_is_depth_first() {
        let snapshot = HierarchySnapshot::new(
            vec![
                unit("hq", "HQ", None, &[]),
                unit("p1", "1", Some("hq"), &[]),
                unit("p2", "2", Some("hq"), &[]),
                unit("s11", "1-1", Some("p1"), &[]),
            ],
            ranks(),
            vec![],
        )
        .unwrap();

        let order: Vec<&str> = snapshot
            .units_in_traversal_order()
            .iter()
            .map(|unit| unit.id.as_str())
            .collect();
        assert_eq!(order, vec!["hq", "p1", "s11", "p2"]);
        assert_eq!(snapshot.children_of(snapshot.find_unit_by_id("hq").unwrap()).len(), 2);
        assert_eq!(
            snapshot.parent_of(snapshot.find_unit_by_id("s11").unwrap()).map(|u| u.id.as_str()),
            Some("p1")
        );
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let result =
            HierarchySnapshot::new(vec![unit("a", "A", Some("missing"), &[])], vec![], vec![]);
        assert!(matches!(result, Err(HierarchyError::UnknownParent { .. })));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let result = HierarchySnapshot::new(
            vec![unit("a", "A", None, &[]), unit("a", "B", None, &[])],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(HierarchyError::DuplicateUnit(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = HierarchySnapshot::new(
            vec![unit("a", "A", Some("b"), &[]), unit("b", "B", Some("a"), &[])],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(HierarchyError::Cycle(_))));
    }

    #[test]
    fn test_members_ordered_by_seniority_then_declaration() {
        let snapshot = HierarchySnapshot::new(
            vec![unit("s", "1-1-A", None, &["pte1", "sgt", "pte2", "ghost", "cpl"])],
            ranks(),
            vec![
                account("pte1", "Adams", "Private"),
                account("sgt", "Baker", "Sergeant"),
                account("pte2", "Clark", "Private"),
                account("cpl", "Davis", "Corporal"),
            ],
        )
        .unwrap();

        let data = MissionPatchData::build(&snapshot);
        let names: Vec<&str> = data.units[0]
            .members
            .iter()
            .map(|&id| data.player(id).name.as_str())
            .collect();
        assert_eq!(names, vec!["Baker", "Davis", "Adams", "Clark"]);
        assert_eq!(data.players.len(), 4);
    }

    #[test]
    fn test_roles_resolve_to_players() {
        let mut section = unit("s", "1-1-A", None, &["sgt", "pte"]);
        section.roles.insert("1iC".to_string(), "sgt".to_string());
        section.roles.insert("Medic".to_string(), "missing".to_string());
        let snapshot = HierarchySnapshot::new(
            vec![section],
            ranks(),
            vec![account("sgt", "Baker", "Sergeant"), account("pte", "Adams", "Private")],
        )
        .unwrap();

        let data = MissionPatchData::build(&snapshot);
        let unit = &data.units[0];
        assert_eq!(unit.roles.len(), 1);
        assert_eq!(unit.role_of(unit.members[0]), Some("1iC"));
        assert_eq!(unit.role_of(unit.members[1]), None);
    }

    #[test]
    fn test_display_name_uses_rank_abbreviation() {
        let player = MissionPlayer {
            name: "Baker".to_string(),
            object_class: None,
            rank: Some(rank("Sergeant", "Sgt", "SERGEANT")),
            unit: UnitId(0),
            account_id: "sgt".to_string(),
        };
        assert_eq!(player.display_name(), "Sgt.Baker");
    }
}
