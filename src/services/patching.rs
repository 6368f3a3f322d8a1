use crate::models::{
    HierarchyError, Mission, MissionPatchData, MissionPatchingResult, PatcherSettings,
};
use crate::services::hierarchy::UnitHierarchyLoader;
use crate::services::matcher::SlotMatcher;
use crate::services::parser::EntityParser;
use crate::services::patcher::{MissionPatcher, PatchedDocument, RewriteError};
use crate::services::reader::{SqmDocument, SqmTextReader};
use crate::services::report::ReportBuilder;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop a run before a result can be produced.
///
/// Parse failures never surface here: they become an Error report in the
/// returned result. [`PatchError::Rewrite`] only travels between the patch
/// step and [`MissionPatchingService::patch_document`], which folds it into
/// the result the same way.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Mission {0} not found")]
    NotFound(String),

    #[error("Mission name {name} matches several missions: {candidates:?}")]
    AmbiguousMission {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Failed to patch mission: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Unit hierarchy unavailable: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Where a mission lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionLocation {
    pub name: String,
    pub directory: Utf8PathBuf,
    pub sqm_path: Utf8PathBuf,
    pub description_path: Option<Utf8PathBuf>,
}

/// In-memory outcome of a run.
#[derive(Debug, Clone)]
pub struct MissionRun {
    pub result: MissionPatchingResult,
    /// Patched buffer; `None` when the run failed or changed nothing.
    pub output: Option<PatchedDocument>,
}

/// Orchestrates parse → roster snapshot → match → patch → write-back.
///
/// Each call builds its own [`Mission`] and [`MissionPatchData`], so one
/// service can patch several missions concurrently.
pub struct MissionPatchingService {
    settings: PatcherSettings,
    loader: Arc<dyn UnitHierarchyLoader>,
    parser: EntityParser,
    matcher: SlotMatcher,
    patcher: MissionPatcher,
}

impl MissionPatchingService {
    pub fn new(settings: PatcherSettings, loader: Arc<dyn UnitHierarchyLoader>) -> Self {
        Self {
            parser: EntityParser::with_markers(settings.slot_markers.clone()),
            matcher: SlotMatcher::new(&settings),
            patcher: MissionPatcher::new(),
            settings,
            loader,
        }
    }

    /// Replace the parser, e.g. to plug in a different slot predicate.
    pub fn with_parser(mut self, parser: EntityParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn settings(&self) -> &PatcherSettings {
        &self.settings
    }

    /// Patch a mission in place.
    ///
    /// # Errors
    ///
    /// - [`PatchError::NotFound`] / [`PatchError::AmbiguousMission`] when the
    ///   name does not resolve to exactly one mission
    /// - [`PatchError::Io`] when the mission cannot be read or written
    /// - [`PatchError::Hierarchy`] when no roster snapshot is available
    ///
    /// A mission that fails to parse or cannot be rewritten safely returns
    /// `Ok` with `success == false`; the file on disk is left untouched.
    pub async fn patch_mission_file(
        &self,
        mission_name: &str,
    ) -> Result<MissionPatchingResult, PatchError> {
        let location = self.locate_mission(mission_name).await?;
        tracing::info!("Patching mission {} ({})", location.name, location.sqm_path);

        let document = SqmTextReader::read(&location.sqm_path)
            .await
            .map_err(|source| PatchError::Io {
                path: location.sqm_path.to_string(),
                source,
            })?;

        let sqm_path = location.sqm_path.clone();
        let run = self.patch_document(location, document)?;

        if let Some(output) = &run.output {
            write_atomically(&sqm_path, output.document.to_text())
                .await
                .map_err(|source| PatchError::Io {
                    path: sqm_path.to_string(),
                    source,
                })?;
            tracing::info!(
                "Wrote {} changed lines to {}",
                output.changed_lines.len(),
                sqm_path
            );
        }

        tracing::info!("Mission {}: {}", mission_name, run.result.summary());
        Ok(run.result)
    }

    /// Run the synchronous part of the pipeline on an already loaded document.
    pub fn patch_document(
        &self,
        location: MissionLocation,
        document: SqmDocument,
    ) -> Result<MissionRun, PatchError> {
        let mut reports = ReportBuilder::new();

        let parsed = match self.parser.parse(&document) {
            Ok(parsed) => parsed,
            Err(error) => {
                reports.error("Failed to parse mission", error.to_string());
                return Ok(MissionRun {
                    result: reports.build(0),
                    output: None,
                });
            }
        };
        reports.extend(parsed.warnings);

        let mut mission = Mission {
            name: location.name,
            directory: location.directory,
            sqm_path: location.sqm_path,
            description_path: location.description_path,
            document,
            tree: parsed.tree,
            player_count: 0,
            max_curators: self.settings.max_curators,
        };
        tracing::info!(
            "Parsed {}: {} entity blocks, {} items, {} slots",
            mission.name,
            mission.tree.entities().count(),
            mission.tree.item_count(),
            mission.tree.slots().len()
        );

        match self.patch_mission(&mut mission, &mut reports) {
            Ok(output) => {
                let output = (!output.changed_lines.is_empty()).then_some(output);
                Ok(MissionRun {
                    result: reports.build(mission.player_count),
                    output,
                })
            }
            Err(PatchError::Rewrite(error)) => {
                reports.error("Failed to patch mission", error.to_string());
                mission.tree.clear_assignments();
                Ok(MissionRun {
                    result: reports.build(0),
                    output: None,
                })
            }
            Err(error) => Err(error),
        }
    }

    fn patch_mission(
        &self,
        mission: &mut Mission,
        reports: &mut ReportBuilder,
    ) -> Result<PatchedDocument, PatchError> {
        let snapshot = self.loader.load_snapshot()?;
        let data = MissionPatchData::build(&snapshot);

        let summary = self.matcher.assign(&mut mission.tree, &data, reports);
        mission.player_count = summary.assigned;
        debug_assert!(summary.curators_assigned <= mission.max_curators);

        let patched = self.patcher.patch(&mission.document, &mission.tree, &data)?;
        Ok(patched)
    }

    /// Resolve a mission name to its directory.
    ///
    /// Tries `<missions_dir>/<name>` first, then a single `<name>.<world>`
    /// directory (case-insensitive).
    pub async fn locate_mission(
        &self,
        mission_name: &str,
    ) -> Result<MissionLocation, PatchError> {
        let name = mission_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PatchError::NotFound(mission_name.to_string()));
        }

        let root = &self.settings.missions_dir;
        let exact = root.join(name);
        let directory = if is_dir(&exact).await {
            exact
        } else {
            let candidates = self.world_candidates(root, name).await?;
            match candidates.as_slice() {
                [] => return Err(PatchError::NotFound(name.to_string())),
                [single] => root.join(single),
                _ => {
                    return Err(PatchError::AmbiguousMission {
                        name: name.to_string(),
                        candidates,
                    });
                }
            }
        };

        let sqm_path = directory.join(&self.settings.mission_file);
        if !is_file(&sqm_path).await {
            tracing::warn!(
                "Mission directory {} has no {}",
                directory,
                self.settings.mission_file
            );
            return Err(PatchError::NotFound(name.to_string()));
        }

        let description = directory.join("description.ext");
        let description_path = is_file(&description).await.then_some(description);

        Ok(MissionLocation {
            name: name.to_string(),
            directory,
            sqm_path,
            description_path,
        })
    }

    async fn world_candidates(
        &self,
        root: &Utf8Path,
        name: &str,
    ) -> Result<Vec<String>, PatchError> {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Missions directory {} does not exist", root);
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(PatchError::Io {
                    path: root.to_string(),
                    source,
                });
            }
        };

        let prefix = format!("{}.", name.to_lowercase());
        let mut candidates = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(PatchError::Io {
                        path: root.to_string(),
                        source,
                    });
                }
            };
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let is_directory = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            let world = file_name.to_lowercase();
            if is_directory
                && world
                    .strip_prefix(&prefix)
                    .is_some_and(|world| !world.is_empty() && !world.contains('.'))
            {
                candidates.push(file_name);
            }
        }

        candidates.sort();
        Ok(candidates)
    }
}

async fn is_dir(path: &Utf8Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Utf8Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// Write the full buffer to a uniquely named sibling file, flush it to disk,
/// then rename it over `path`.
async fn write_atomically(path: &Utf8Path, contents: String) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let directory = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut temporary = tempfile::Builder::new()
            .prefix(".sqmpatch-")
            .suffix(".tmp")
            .tempfile_in(directory)?;
        temporary.write_all(contents.as_bytes())?;
        temporary.as_file().sync_all()?;
        temporary.persist(&path).map_err(|error| error.error)?;
        Ok::<(), io::Error>(())
    })
    .await
    .map_err(io::Error::other)?
}
