//! Parser for the class/brace mission format.
//!
//! Parsing runs in two stages:
//!
//! 1. [`parse_class_tree`] is a recursive-descent line scanner producing a
//!    generic [`ClassNode`] tree. Every class and property remembers the lines
//!    it came from.
//! 2. [`EntityParser::parse`] maps `class Mission` → `class Entities` onto a
//!    [`MissionTree`], classifying items through a [`SlotPredicate`] and
//!    checking each block's `items=N;` declaration.
//!
//! ```text
//! class Mission
//! {
//!     class Entities
//!     {
//!         items=1;
//!         class Item0
//!         {
//!             dataType="Group";
//!             callsign="1-1-A";
//!             class Entities { ... };
//!         };
//!     };
//! };
//! ```

use crate::models::{
    EntityId, ItemId, LineRange, MissionEntity, MissionEntityItem, MissionPatchingReport,
    MissionTree, SlotKind, SlotMarkers, SqmProperty,
};
use crate::services::reader::SqmDocument;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Structural failure while parsing a mission file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SqmParseError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl SqmParseError {
    fn at(index: usize, message: impl Into<String>) -> Self {
        Self {
            line: index + 1,
            message: message.into(),
        }
    }
}

/// A generic class block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNode {
    pub name: String,
    /// Inherited class from `class Name: Base`.
    pub base: Option<String>,
    pub header_line: usize,
    pub end_line: usize,
    pub properties: Vec<SqmProperty>,
    pub children: Vec<ClassNode>,
}

impl ClassNode {
    fn new(name: String, base: Option<String>, header_line: usize) -> Self {
        Self {
            name,
            base,
            header_line,
            end_line: header_line,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// First direct child with the given name (case-insensitive).
    pub fn child(&self, name: &str) -> Option<&ClassNode> {
        self.children
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    pub fn property(&self, key: &str) -> Option<&SqmProperty> {
        self.properties
            .iter()
            .find(|property| property.key.eq_ignore_ascii_case(key))
    }
}

/// Parse a document into a [`ClassNode`] tree.
///
/// The returned node is an unnamed root spanning the whole file.
pub fn parse_class_tree(document: &SqmDocument) -> Result<ClassNode, SqmParseError> {
    let mut root = ClassNode::new(String::new(), None, 0);
    root.end_line = document.len().saturating_sub(1);

    let mut scanner = Scanner::new(document);
    scanner.parse_body(&mut root, None)?;
    Ok(root)
}

struct Scanner<'a> {
    document: &'a SqmDocument,
    cursor: usize,
    in_block_comment: bool,
    /// Statements of the current line not yet consumed.
    pending: VecDeque<(usize, String)>,
}

impl<'a> Scanner<'a> {
    fn new(document: &'a SqmDocument) -> Self {
        Self {
            document,
            cursor: 0,
            in_block_comment: false,
            pending: VecDeque::new(),
        }
    }

    /// Next statement with comments stripped, tagged with its line index.
    fn next_statement(&mut self) -> Option<(usize, String)> {
        loop {
            if let Some(statement) = self.pending.pop_front() {
                return Some(statement);
            }
            if self.cursor >= self.document.len() {
                return None;
            }

            let index = self.cursor;
            self.cursor += 1;
            let line = self.document.content(index);
            if !self.in_block_comment && line.trim_start().starts_with('#') {
                continue;
            }

            let code = strip_comments(line, &mut self.in_block_comment);
            self.pending.extend(
                split_statements(&code)
                    .into_iter()
                    .map(|statement| (index, statement.to_string())),
            );
        }
    }

    /// Consume statements into `node` until its closing brace.
    ///
    /// `opened_at` is `None` for the file root, which ends at end of input.
    fn parse_body(
        &mut self,
        node: &mut ClassNode,
        opened_at: Option<usize>,
    ) -> Result<(), SqmParseError> {
        loop {
            let Some((index, line)) = self.next_statement() else {
                return match opened_at {
                    Some(open) => Err(SqmParseError::at(
                        open,
                        format!("class {} is never closed", node.name),
                    )),
                    None => Ok(()),
                };
            };

            if line == "}" {
                if opened_at.is_none() {
                    return Err(SqmParseError::at(
                        index,
                        "closing brace without an open class",
                    ));
                }
                node.end_line = index;
                return Ok(());
            }

            if let Some(header) = class_header(&line) {
                let child = self.parse_class(index, header)?;
                node.children.push(child);
                continue;
            }

            if line.contains('=') {
                let property = self.parse_property(index, &line)?;
                node.properties.push(property);
                continue;
            }

            return Err(SqmParseError::at(
                index,
                format!("unrecognised statement `{}`", line),
            ));
        }
    }

    /// Parse a class header and, unless it is a forward declaration, its body.
    fn parse_class(&mut self, index: usize, header: &str) -> Result<ClassNode, SqmParseError> {
        let (head, rest) = match header.find(['{', ';']) {
            Some(position) => (&header[..position], &header[position..]),
            None => (header, ""),
        };
        let (name, base) = parse_class_name(index, head)?;

        if rest.starts_with(';') {
            // Forward declaration: `class Name;`
            return Ok(ClassNode::new(name, base, index));
        }

        let mut node = ClassNode::new(name, base, index);
        if !rest.starts_with('{') {
            match self.next_statement() {
                Some((_, line)) if line == "{" => {}
                Some((brace_index, _)) => {
                    return Err(SqmParseError::at(
                        brace_index,
                        format!("expected `{{` after class {}", node.name),
                    ));
                }
                None => {
                    return Err(SqmParseError::at(
                        index,
                        format!("class {} has no body", node.name),
                    ));
                }
            }
        }

        self.parse_body(&mut node, Some(index))?;
        Ok(node)
    }

    /// Parse `key=value;` or `key[]={...};`, consuming continuation lines of
    /// multi-line arrays.
    fn parse_property(
        &mut self,
        index: usize,
        line: &str,
    ) -> Result<SqmProperty, SqmParseError> {
        let Some((key_part, value_part)) = line.split_once('=') else {
            return Err(SqmParseError::at(index, "expected `=`"));
        };

        let key_part = key_part.trim();
        let (key, is_array) = match key_part.strip_suffix("[]") {
            Some(key) => (key.trim(), true),
            None => (key_part, false),
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SqmParseError::at(
                index,
                format!("invalid property name `{}`", key_part),
            ));
        }

        let value_part = value_part.trim();
        if !is_array {
            return Ok(SqmProperty {
                key: key.to_string(),
                raw_value: strip_terminator(value_part).to_string(),
                line: index,
                end_line: index,
                is_array: false,
            });
        }

        let mut value = value_part.to_string();
        let mut depth = brace_balance(value_part);
        let mut opened = value_part.contains('{');
        let mut end_line = index;

        while !opened || depth > 0 {
            if self.cursor >= self.document.len() {
                return Err(SqmParseError::at(
                    index,
                    format!("array {} is never closed", key),
                ));
            }
            end_line = self.cursor;
            self.cursor += 1;

            let continuation = self.document.content(end_line).trim();
            depth += brace_balance(continuation);
            opened |= continuation.contains('{');
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(continuation);
        }

        Ok(SqmProperty {
            key: key.to_string(),
            raw_value: strip_terminator(&value).to_string(),
            line: index,
            end_line,
            is_array: true,
        })
    }
}

fn parse_class_name(index: usize, head: &str) -> Result<(String, Option<String>), SqmParseError> {
    let (name, base) = match head.split_once(':') {
        Some((name, base)) => (name.trim(), Some(base.trim())),
        None => (head.trim(), None),
    };

    let valid = |text: &str| {
        !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !valid(name) || base.is_some_and(|base| !valid(base)) {
        return Err(SqmParseError::at(
            index,
            format!("invalid class header `class {}`", head.trim()),
        ));
    }

    Ok((name.to_string(), base.map(str::to_string)))
}

fn strip_terminator(value: &str) -> &str {
    value.trim_end().strip_suffix(';').unwrap_or(value).trim_end()
}

/// Remove `//` and `/* */` comments outside string literals.
///
/// `in_block_comment` carries an open block comment across lines; code after
/// a closing `*/` is kept.
fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut code = String::with_capacity(line.len());
    let mut in_string = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if *in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block_comment = false;
                code.push(' ');
            }
            continue;
        }
        match c {
            '"' => {
                in_string = !in_string;
                code.push(c);
            }
            '/' if !in_string && chars.peek() == Some(&'/') => break,
            '/' if !in_string && chars.peek() == Some(&'*') => {
                chars.next();
                *in_block_comment = true;
            }
            _ => code.push(c),
        }
    }
    code
}

/// `Name: Base {` from `class Name: Base {`.
fn class_header(statement: &str) -> Option<&str> {
    statement
        .strip_prefix("class")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
}

/// Split a comment-free line into statements.
///
/// A statement is a class header up to its `{`, a lone `{` or `}`, or a
/// `;`-terminated property. Braces inside string literals and array values
/// do not split. Whatever is left unterminated at the end of the line (an
/// open array, a header whose brace follows on the next line) is returned as
/// the last statement.
fn split_statements(code: &str) -> Vec<&str> {
    fn push<'s>(statements: &mut Vec<&'s str>, piece: &'s str) {
        let piece = piece.trim();
        if !piece.is_empty() && piece != ";" {
            statements.push(piece);
        }
    }

    let mut statements = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut in_string = false;

    for (position, c) in code.char_indices() {
        match c {
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => {
                let current = code[start..position].trim();
                if depth == 0 && (current.is_empty() || class_header(current).is_some()) {
                    push(&mut statements, &code[start..=position]);
                    start = position + 1;
                } else {
                    depth += 1;
                }
            }
            '}' if depth > 0 => depth -= 1,
            '}' => {
                push(&mut statements, &code[start..position]);
                push(&mut statements, &code[position..=position]);
                start = position + 1;
            }
            ';' if depth == 0 => {
                push(&mut statements, &code[start..=position]);
                start = position + 1;
            }
            _ => {}
        }
    }
    push(&mut statements, &code[start..]);
    statements
}

/// Net brace depth of a line, ignoring braces inside string literals.
fn brace_balance(text: &str) -> i64 {
    let mut in_string = false;
    let mut depth = 0;
    for c in text.chars() {
        match c {
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Decides whether an item is a player slot.
pub trait SlotPredicate: Send + Sync {
    fn classify(&self, item: &MissionEntityItem) -> SlotKind;
}

/// Classifies items from their marker properties.
///
/// - `type` listed in `curator_types` → [`SlotKind::Curator`]
/// - `dataType` listed in `playable_data_types` and any `playable_keys`
///   property set to `1` → [`SlotKind::Playable`]
#[derive(Debug, Clone, Default)]
pub struct MarkerSlotPredicate {
    markers: SlotMarkers,
}

impl MarkerSlotPredicate {
    pub fn new(markers: SlotMarkers) -> Self {
        Self { markers }
    }
}

impl SlotPredicate for MarkerSlotPredicate {
    fn classify(&self, item: &MissionEntityItem) -> SlotKind {
        let is_curator = item.object_type.as_deref().is_some_and(|object_type| {
            self.markers
                .curator_types
                .iter()
                .any(|curator| curator.eq_ignore_ascii_case(object_type))
        });
        if is_curator {
            return SlotKind::Curator;
        }

        let playable_type = item.data_type.as_deref().is_some_and(|data_type| {
            self.markers
                .playable_data_types
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(data_type))
        });
        let marked = self
            .markers
            .playable_keys
            .iter()
            .any(|key| item.property(key).is_some_and(SqmProperty::is_set));

        if playable_type && marked {
            SlotKind::Playable
        } else {
            SlotKind::NotPlayable
        }
    }
}

/// A parsed mission tree plus the structural warnings found on the way.
#[derive(Debug, Clone)]
pub struct ParsedMission {
    pub tree: MissionTree,
    pub warnings: Vec<MissionPatchingReport>,
}

/// Builds a [`MissionTree`] from a mission document.
#[derive(Clone)]
pub struct EntityParser {
    predicate: Arc<dyn SlotPredicate>,
}

impl EntityParser {
    pub fn new(predicate: Arc<dyn SlotPredicate>) -> Self {
        Self { predicate }
    }

    pub fn with_markers(markers: SlotMarkers) -> Self {
        Self::new(Arc::new(MarkerSlotPredicate::new(markers)))
    }

    pub fn parse(&self, document: &SqmDocument) -> Result<ParsedMission, SqmParseError> {
        let root = parse_class_tree(document)?;
        let mission = root
            .child("Mission")
            .ok_or_else(|| SqmParseError::at(0, "mission file has no `class Mission` block"))?;

        let mut builder = TreeBuilder {
            predicate: self.predicate.as_ref(),
            entities: Vec::new(),
            items: Vec::new(),
            warnings: Vec::new(),
        };

        let root_id = match mission.child("Entities") {
            Some(entities) => builder.build_entity(entities, None),
            None => {
                tracing::debug!("Mission declares no Entities block");
                builder.entities.push(MissionEntity {
                    items: Vec::new(),
                    items_count: Some(0),
                    block: LineRange::new(mission.header_line, mission.end_line),
                    owner: None,
                });
                EntityId(0)
            }
        };

        let tree = MissionTree {
            entities: builder.entities,
            items: builder.items,
            root: root_id,
        };

        tracing::debug!(
            "Parsed mission: {} entity blocks, {} items, {} slots",
            tree.entities.len(),
            tree.items.len(),
            tree.slots().len()
        );

        Ok(ParsedMission {
            tree,
            warnings: builder.warnings,
        })
    }
}

impl Default for EntityParser {
    fn default() -> Self {
        Self::with_markers(SlotMarkers::default())
    }
}

struct TreeBuilder<'p> {
    predicate: &'p dyn SlotPredicate,
    entities: Vec<MissionEntity>,
    items: Vec<MissionEntityItem>,
    warnings: Vec<MissionPatchingReport>,
}

impl TreeBuilder<'_> {
    fn build_entity(&mut self, node: &ClassNode, owner: Option<ItemId>) -> EntityId {
        let id = EntityId(self.entities.len());
        let items_count = node
            .property("items")
            .and_then(|property| property.string_value().trim().parse::<usize>().ok());

        self.entities.push(MissionEntity {
            items: Vec::new(),
            items_count,
            block: LineRange::new(node.header_line, node.end_line),
            owner,
        });

        let items: Vec<ItemId> = node
            .children
            .iter()
            .filter(|child| is_item_class(&child.name))
            .map(|child| self.build_item(child, owner))
            .collect();

        match items_count {
            Some(declared) if declared != items.len() => {
                self.warnings.push(MissionPatchingReport::warning(
                    "Entity count mismatch",
                    format!(
                        "Entities block at line {} declares items={} but contains {} items",
                        node.header_line + 1,
                        declared,
                        items.len()
                    ),
                ));
            }
            None => {
                self.warnings.push(MissionPatchingReport::warning(
                    "Entity count missing",
                    format!(
                        "Entities block at line {} does not declare an item count ({} items found)",
                        node.header_line + 1,
                        items.len()
                    ),
                ));
            }
            _ => {}
        }

        self.entities[id.0].items = items;
        id
    }

    fn build_item(&mut self, node: &ClassNode, parent: Option<ItemId>) -> ItemId {
        let mut properties: IndexMap<String, SqmProperty> = IndexMap::new();
        let attributes = node.child("Attributes");
        let own = node.properties.iter();
        let inherited = attributes.into_iter().flat_map(|attr| attr.properties.iter());
        for property in own.chain(inherited).filter(|property| !property.is_array) {
            properties
                .entry(property.key.to_ascii_lowercase())
                .or_insert_with(|| property.clone());
        }

        let mut property_lines: Vec<usize> =
            properties.values().map(|property| property.line).collect();
        property_lines.sort_unstable();

        let mut item = MissionEntityItem {
            class_name: node.name.clone(),
            data_type: node.property("dataType").map(SqmProperty::string_value),
            object_type: node.property("type").map(SqmProperty::string_value),
            slot_kind: SlotKind::NotPlayable,
            properties,
            property_lines,
            block: LineRange::new(node.header_line, node.end_line),
            entities: None,
            parent,
            assigned_player: None,
        };
        item.slot_kind = self.predicate.classify(&item);

        let id = ItemId(self.items.len());
        self.items.push(item);

        if let Some(nested) = node.child("Entities") {
            let nested_id = self.build_entity(nested, Some(id));
            self.items[id.0].entities = Some(nested_id);
        }

        id
    }
}

/// `Item0`, `Item17`... (case-insensitive).
fn is_item_class(name: &str) -> bool {
    name.len() > 4
        && name[..4].eq_ignore_ascii_case("item")
        && name[4..].chars().all(|c| c.is_ascii_digit())
}
