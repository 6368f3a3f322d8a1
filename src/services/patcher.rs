use crate::models::{ItemId, MissionPatchData, MissionTree, PlayerId, SlotKind};
use crate::services::reader::{SqmDocument, split_terminator};
use regex::Regex;
use thiserror::Error;

/// Rewrites that cannot be applied without disturbing other lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Slot {slot} has no {field} line to rewrite")]
    MissingIdentityField { slot: String, field: String },

    #[error("Rewriting {slot} would change the line count: {detail}")]
    LineCountChanged { slot: String, detail: String },

    #[error("Line {line} of {slot} is not a single key=value statement")]
    UnwritableLine { slot: String, line: usize },
}

/// Result of a patch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedDocument {
    pub document: SqmDocument,
    /// 0-based indices of lines whose content changed.
    pub changed_lines: Vec<usize>,
}

/// Writes assigned players into their slots.
///
/// Only single-line property statements inside a matched slot's own property
/// set are substituted. Every other line of the document, including the
/// lines of unmatched slots, is copied through untouched, and the output
/// always has exactly as many lines as the input.
///
/// Identity fields written per slot:
///
/// - `description`: `Abbr.Name`, with ` - Role` when the player holds a unit role
/// - `rank`: the rank's in-game name (playable slots, existing line only)
/// - `type`: the unit's object class (playable slots, existing line only)
pub struct MissionPatcher {
    /// `key = value` with an optional `;` and trailing text; quoted values
    /// may contain doubled quotes and semicolons.
    statement_pattern: Regex,
}

impl MissionPatcher {
    pub fn new() -> Self {
        Self {
            statement_pattern: Regex::new(
                r#"^(?P<prefix>\s*(?P<key>[A-Za-z0-9_]+)\s*=\s*)(?P<value>"(?:[^"]|"")*"|[^;]*)(?P<suffix>.*)$"#,
            )
            .expect("Invalid statement regex"),
        }
    }

    pub fn patch(
        &self,
        document: &SqmDocument,
        tree: &MissionTree,
        data: &MissionPatchData,
    ) -> Result<PatchedDocument, RewriteError> {
        let mut lines: Vec<String> = document.lines().map(str::to_string).collect();
        let mut changed_lines = Vec::new();

        for (id, item) in tree.items() {
            let Some(player) = item.assigned_player else {
                continue;
            };

            for (field, value) in identity_fields(tree, id, data, player) {
                let Some(property) = item.property(field) else {
                    if field == "description" {
                        return Err(RewriteError::MissingIdentityField {
                            slot: tree.describe(id),
                            field: field.to_string(),
                        });
                    }
                    continue;
                };

                if property.line != property.end_line
                    || !item.property_lines.contains(&property.line)
                {
                    return Err(RewriteError::UnwritableLine {
                        slot: tree.describe(id),
                        line: property.line + 1,
                    });
                }

                if value.contains(['\n', '\r']) {
                    return Err(RewriteError::LineCountChanged {
                        slot: tree.describe(id),
                        detail: format!("{} value contains a line break", field),
                    });
                }

                let rewritten = self
                    .rewrite_line(&lines[property.line], &property.key, &quote(&value))
                    .ok_or_else(|| RewriteError::UnwritableLine {
                        slot: tree.describe(id),
                        line: property.line + 1,
                    })?;

                if rewritten != lines[property.line] {
                    lines[property.line] = rewritten;
                    changed_lines.push(property.line);
                }
            }
        }

        let patched = SqmDocument::from_lines(lines);
        let reparsed = SqmDocument::from_text(&patched.to_text());
        if reparsed.len() != document.len() {
            return Err(RewriteError::LineCountChanged {
                slot: "mission".to_string(),
                detail: format!("{} lines became {}", document.len(), reparsed.len()),
            });
        }

        changed_lines.sort_unstable();
        changed_lines.dedup();
        tracing::debug!("Rewrote {} lines", changed_lines.len());

        Ok(PatchedDocument {
            document: patched,
            changed_lines,
        })
    }

    /// Replace the value of a raw `key=value;` line, keeping indentation,
    /// key spelling, trailing text and the line terminator.
    ///
    /// `None` unless the line starts with a statement for `key`.
    fn rewrite_line(&self, raw: &str, key: &str, new_value: &str) -> Option<String> {
        let (content, ending) = split_terminator(raw);
        let (bom, content) = match content.strip_prefix('\u{feff}') {
            Some(rest) => ("\u{feff}", rest),
            None => ("", content),
        };

        let captures = self.statement_pattern.captures(content)?;
        if !captures.name("key")?.as_str().eq_ignore_ascii_case(key) {
            return None;
        }
        let prefix = captures.name("prefix")?.as_str();
        let suffix = captures.name("suffix").map_or("", |m| m.as_str());

        Some(format!("{bom}{prefix}{new_value}{suffix}{ending}"))
    }
}

impl Default for MissionPatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn identity_fields(
    tree: &MissionTree,
    id: ItemId,
    data: &MissionPatchData,
    player_id: PlayerId,
) -> Vec<(&'static str, String)> {
    let player = data.player(player_id);
    let unit = data.unit(player.unit);

    let description = match unit.role_of(player_id) {
        Some(role) => format!("{} - {}", player.display_name(), role),
        None => player.display_name(),
    };
    let mut fields = vec![("description", description)];

    if tree.item(id).slot_kind == SlotKind::Playable {
        if let Some(game_rank) = player.rank.as_ref().and_then(|rank| rank.game_rank.clone()) {
            fields.push(("rank", game_rank));
        }
        if let Some(object_class) = &player.object_class {
            fields.push(("type", object_class.clone()));
        }
    }

    fields
}

/// Quote a string value, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
