use serde::Serialize;
use std::fmt;

/// One issue detected while patching a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionPatchingReport {
    pub title: String,
    pub detail: String,
    /// `true` for run-aborting problems, `false` for warnings.
    pub error: bool,
}

impl MissionPatchingReport {
    pub fn warning(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            error: false,
        }
    }

    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            error: true,
        }
    }
}

impl fmt::Display for MissionPatchingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.error { "Error" } else { "Warning" };
        write!(f, "[{}] {}: {}", level, self.title, self.detail)
    }
}

/// Outcome of one patch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionPatchingResult {
    pub player_count: usize,
    /// `true` iff no report is an error.
    pub success: bool,
    pub reports: Vec<MissionPatchingReport>,
}

impl MissionPatchingResult {
    pub fn warnings(&self) -> impl Iterator<Item = &MissionPatchingReport> {
        self.reports.iter().filter(|report| !report.error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &MissionPatchingReport> {
        self.reports.iter().filter(|report| report.error)
    }

    /// One-line summary for logs and the command line.
    pub fn summary(&self) -> String {
        let status = if self.success { "patched" } else { "failed" };
        format!(
            "{} - {} players, {} warnings, {} errors",
            status,
            self.player_count,
            self.warnings().count(),
            self.errors().count()
        )
    }
}
