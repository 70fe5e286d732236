use crate::config::AnalysisConfig;
use crate::join::{JoinedTable, DELTA_TOTAL_SCORE, IMPROVEMENT_SCHOOL_RANK};
use crate::table::mean;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avg_score_monthly: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avg_score_midterm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avg_score_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avg_rank_improvement: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub avg_score_monthly: Option<f64>,
    pub avg_score_midterm: Option<f64>,
    pub delta: Option<f64>,
}

/// Orders class keys numerically when both parse as numbers, else as text.
pub fn compare_class_keys(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// One row per midterm class, ascending by class key. Rows with no class are skipped.
pub fn class_summaries(joined: &JoinedTable) -> Vec<ClassSummary> {
    let t = &joined.table;
    let class_col = joined.midterm("class_name");
    if !t.has_column(&class_col) {
        return Vec::new();
    }

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in 0..t.row_count() {
        if let Some(class) = t.text(row, &class_col) {
            groups.entry(class).or_default().push(row);
        }
    }

    let metric = |rows: &[usize], column: &str| -> Option<f64> {
        if !t.has_column(column) {
            return None;
        }
        mean(rows.iter().map(|r| t.number(*r, column)))
    };

    let monthly_total = joined.monthly("total_score");
    let midterm_total = joined.midterm("total_score");

    let mut out: Vec<ClassSummary> = groups
        .into_iter()
        .map(|(class_name, rows)| ClassSummary {
            avg_score_monthly: metric(&rows, &monthly_total),
            avg_score_midterm: metric(&rows, &midterm_total),
            avg_score_change: metric(&rows, DELTA_TOTAL_SCORE),
            avg_rank_improvement: metric(&rows, IMPROVEMENT_SCHOOL_RANK),
            class_name,
        })
        .collect();
    out.sort_by(|a, b| compare_class_keys(&a.class_name, &b.class_name));
    debug!(classes = out.len(), "class summaries");
    out
}

/// One row per configured subject that has score columns on both sides. Empty when no
/// student sat both exams.
pub fn subject_summaries(joined: &JoinedTable, config: &AnalysisConfig) -> Vec<SubjectSummary> {
    if joined.is_empty() {
        return Vec::new();
    }
    let t = &joined.table;
    let mut out = Vec::new();
    for subject in &config.subjects {
        let score = AnalysisConfig::score_column(subject);
        let (Some(monthly), Some(midterm)) = (
            t.numbers(&joined.monthly(&score)),
            t.numbers(&joined.midterm(&score)),
        ) else {
            continue;
        };
        let avg_score_monthly = mean(monthly);
        let avg_score_midterm = mean(midterm);
        let delta = match (avg_score_monthly, avg_score_midterm) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        };
        out.push(SubjectSummary {
            subject: subject.clone(),
            avg_score_monthly,
            avg_score_midterm,
            delta,
        });
    }
    debug!(subjects = out.len(), "subject summaries");
    out
}
