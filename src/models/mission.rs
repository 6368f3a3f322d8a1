use crate::models::roster::PlayerId;
use crate::services::reader::SqmDocument;
use camino::Utf8PathBuf;
use indexmap::IndexMap;

/// Index of a [`MissionEntity`] inside its [`MissionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) usize);

/// Index of a [`MissionEntityItem`] inside its [`MissionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) usize);

/// Inclusive, 0-based range of lines in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }

    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// How an item takes part in slotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A player-assignable object.
    Playable,
    /// A capped game master slot.
    Curator,
    /// Logic, markers, props and everything else.
    NotPlayable,
}

/// A single `key=value;` or `key[]={...};` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqmProperty {
    /// Key as written in the file (without `[]`).
    pub key: String,
    /// Value text between `=` and the terminating `;`, untrimmed of quotes.
    pub raw_value: String,
    /// First line of the statement.
    pub line: usize,
    /// Last line of the statement (differs from `line` for multi-line arrays).
    pub end_line: usize,
    pub is_array: bool,
}

impl SqmProperty {
    /// Value with surrounding quotes removed and doubled quotes collapsed.
    pub fn string_value(&self) -> String {
        let value = self.raw_value.trim();
        match value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
        {
            Some(inner) => inner.replace("\"\"", "\""),
            None => value.to_string(),
        }
    }

    /// True for numeric `1` (the format's boolean).
    pub fn is_set(&self) -> bool {
        !self.is_array && self.string_value().trim() == "1"
    }
}

/// One `class Entities` block: an ordered list of items.
#[derive(Debug, Clone)]
pub struct MissionEntity {
    pub items: Vec<ItemId>,
    /// The `items=N;` declaration, if present.
    pub items_count: Option<usize>,
    pub block: LineRange,
    /// Group item holding this block, `None` for the mission root.
    pub owner: Option<ItemId>,
}

impl MissionEntity {
    pub fn count_matches(&self) -> bool {
        self.items_count == Some(self.items.len())
    }
}

/// One `class ItemN` node of the mission tree.
///
/// `parent` is a plain index used to reconstruct callsign paths; the tree
/// owns every item through [`MissionTree`]'s arena.
#[derive(Debug, Clone)]
pub struct MissionEntityItem {
    pub class_name: String,
    pub data_type: Option<String>,
    pub object_type: Option<String>,
    pub slot_kind: SlotKind,
    /// Own scalar properties (including those of the direct `Attributes`
    /// child), keyed by lowercase key in declaration order.
    pub properties: IndexMap<String, SqmProperty>,
    /// Sorted line numbers of every own property statement.
    pub property_lines: Vec<usize>,
    /// Lines from the `class ItemN` header to its closing brace.
    pub block: LineRange,
    pub entities: Option<EntityId>,
    pub parent: Option<ItemId>,
    pub assigned_player: Option<PlayerId>,
}

impl MissionEntityItem {
    pub fn is_playable(&self) -> bool {
        self.slot_kind != SlotKind::NotPlayable
    }

    pub fn is_curator(&self) -> bool {
        self.slot_kind == SlotKind::Curator
    }

    /// Case-insensitive property lookup.
    pub fn property(&self, key: &str) -> Option<&SqmProperty> {
        self.properties.get(&key.to_ascii_lowercase())
    }
}

/// Arena-backed tree of a mission's `Entities` section.
///
/// Items are stored in file order (pre-order), which is also slot order.
#[derive(Debug, Clone)]
pub struct MissionTree {
    pub(crate) entities: Vec<MissionEntity>,
    pub(crate) items: Vec<MissionEntityItem>,
    pub(crate) root: EntityId,
}

impl MissionTree {
    pub fn root(&self) -> &MissionEntity {
        &self.entities[self.root.0]
    }

    pub fn root_id(&self) -> EntityId {
        self.root
    }

    pub fn entity(&self, id: EntityId) -> &MissionEntity {
        &self.entities[id.0]
    }

    pub fn item(&self, id: ItemId) -> &MissionEntityItem {
        &self.items[id.0]
    }

    pub fn item_mut(&mut self, id: ItemId) -> &mut MissionEntityItem {
        &mut self.items[id.0]
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &MissionEntity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityId(index), entity))
    }

    pub fn items(&self) -> impl Iterator<Item = (ItemId, &MissionEntityItem)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (ItemId(index), item))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Depth-first walk from the root entity, children in file order.
    pub fn walk(&self) -> Vec<ItemId> {
        let mut order = Vec::with_capacity(self.items.len());
        self.walk_entity(self.root, &mut order);
        order
    }

    fn walk_entity(&self, id: EntityId, order: &mut Vec<ItemId>) {
        for &item_id in &self.entity(id).items {
            order.push(item_id);
            if let Some(nested) = self.item(item_id).entities {
                self.walk_entity(nested, order);
            }
        }
    }

    /// Playable and curator items in traversal order.
    pub fn slots(&self) -> Vec<ItemId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.item(id).is_playable())
            .collect()
    }

    /// The item itself followed by its ancestors up to the root.
    pub fn lineage(&self, id: ItemId) -> impl Iterator<Item = ItemId> + '_ {
        std::iter::successors(Some(id), move |&current| self.item(current).parent)
    }

    /// First property named by `keys` on the item or its nearest ancestor.
    pub fn find_inherited_property(&self, id: ItemId, keys: &[String]) -> Option<&SqmProperty> {
        self.lineage(id).find_map(|ancestor| {
            let item = self.item(ancestor);
            keys.iter().find_map(|key| item.property(key))
        })
    }

    /// Human readable location such as `Item2/Item0 (line 41)`.
    pub fn describe(&self, id: ItemId) -> String {
        let mut names: Vec<&str> = self
            .lineage(id)
            .map(|ancestor| self.item(ancestor).class_name.as_str())
            .collect();
        names.reverse();
        format!("{} (line {})", names.join("/"), self.item(id).block.start + 1)
    }

    pub fn clear_assignments(&mut self) {
        for item in &mut self.items {
            item.assigned_player = None;
        }
    }

    pub fn assigned_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.assigned_player.is_some())
            .count()
    }

    pub fn assigned_curator_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.is_curator() && item.assigned_player.is_some())
            .count()
    }
}

/// One patch target, built per request and discarded after the run.
#[derive(Debug, Clone)]
pub struct Mission {
    pub name: String,
    pub directory: Utf8PathBuf,
    pub sqm_path: Utf8PathBuf,
    /// `description.ext` next to the sqm, when the mission ships one.
    pub description_path: Option<Utf8PathBuf>,
    pub document: SqmDocument,
    pub tree: MissionTree,
    pub player_count: usize,
    pub max_curators: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(raw: &str) -> SqmProperty {
        SqmProperty {
            key: "description".to_string(),
            raw_value: raw.to_string(),
            line: 0,
            end_line: 0,
            is_array: false,
        }
    }

    #[test]
    fn test_string_value_unquotes() {
        assert_eq!(property("\"1-1-A\"").string_value(), "1-1-A");
        assert_eq!(property("\"say \"\"hi\"\"\"").string_value(), "say \"hi\"");
        assert_eq!(property("54").string_value(), "54");
    }

    #[test]
    fn test_is_set() {
        assert!(property("1").is_set());
        assert!(!property("0").is_set());
        assert!(!property("\"yes\"").is_set());
    }

    #[test]
    fn test_line_range() {
        let range = LineRange::new(3, 7);
        assert!(range.contains(3));
        assert!(range.contains(7));
        assert!(!range.contains(8));
        assert_eq!(range.line_count(), 5);
    }
}
