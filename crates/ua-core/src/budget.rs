//! Monthly spend budgets per project.

use serde::{Deserialize, Serialize};

use crate::types::ProjectKey;

/// A monthly spend cap for one project.
///
/// One logical budget exists per project; the record with the latest
/// `updated_at` wins when several have been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub project_key: ProjectKey,
    /// Cap in minor currency units (cents) per calendar month.
    pub monthly_cents: i64,
    /// Ascending alert fractions of the cap, each in \[0, 1\].
    pub alert_thresholds: Vec<f32>,
    pub updated_at: i64,
}

impl Budget {
    /// Creates a budget, normalizing thresholds: clamped to \[0, 1\],
    /// sorted ascending, duplicates removed.
    #[must_use]
    pub fn new(
        project_key: ProjectKey,
        monthly_cents: i64,
        alert_thresholds: Vec<f32>,
        updated_at: i64,
    ) -> Self {
        let mut thresholds: Vec<f32> = alert_thresholds
            .into_iter()
            .map(|t| t.clamp(0.0, 1.0))
            .collect();
        thresholds.sort_by(f32::total_cmp);
        thresholds.dedup();

        Self {
            project_key,
            monthly_cents: monthly_cents.max(0),
            alert_thresholds: thresholds,
            updated_at,
        }
    }

    /// Thresholds the given spend has reached or passed, ascending.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "budget amounts are far below the f64 precision limit"
    )]
    pub fn crossed_thresholds(&self, spent_cents: i64) -> Vec<f32> {
        if self.monthly_cents == 0 {
            return Vec::new();
        }
        let cap = self.monthly_cents as f64;
        self.alert_thresholds
            .iter()
            .copied()
            .filter(|t| spent_cents as f64 >= cap * f64::from(*t))
            .collect()
    }
}
