use crate::models::{MissionPatchingReport, MissionPatchingResult};

/// Accumulates reports from every patching step in detection order.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    reports: Vec<MissionPatchingReport>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, title: impl Into<String>, detail: impl Into<String>) {
        self.push(MissionPatchingReport::warning(title, detail));
    }

    pub fn error(&mut self, title: impl Into<String>, detail: impl Into<String>) {
        self.push(MissionPatchingReport::error(title, detail));
    }

    pub fn push(&mut self, report: MissionPatchingReport) {
        if report.error {
            tracing::error!("{}: {}", report.title, report.detail);
        } else {
            tracing::warn!("{}: {}", report.title, report.detail);
        }
        self.reports.push(report);
    }

    pub fn extend(&mut self, reports: impl IntoIterator<Item = MissionPatchingReport>) {
        for report in reports {
            self.push(report);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(|report| report.error)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Finish the run. `success` is derived from the collected reports.
    pub fn build(self, player_count: usize) -> MissionPatchingResult {
        MissionPatchingResult {
            player_count,
            success: !self.has_errors(),
            reports: self.reports,
        }
    }
}
