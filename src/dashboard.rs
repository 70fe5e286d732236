//! The dashboard document consumed by the front end.
//!
//! Aggregates leave missing values out of means. The per-student block shows missing
//! totals and ranks as 0 so the UI never has to handle nulls.

use crate::config::AnalysisConfig;
use crate::join::{JoinedTable, IMPROVEMENT_SCHOOL_RANK};
use crate::summary::{ClassSummary, SubjectSummary};
use crate::table::mean;
use anyhow::Context;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Integral values go out as JSON integers, everything else as floats.
fn compact_number<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        s.serialize_i64(*v as i64)
    } else {
        s.serialize_f64(*v)
    }
}

fn compact_numbers<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = s.serialize_seq(Some(v.len()))?;
    for n in v {
        seq.serialize_element(&Compact(*n))?;
    }
    seq.end()
}

struct Compact(f64);

impl Serialize for Compact {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        compact_number(&self.0, s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDistribution {
    #[serde(serialize_with = "compact_numbers")]
    pub monthly: Vec<f64>,
    #[serde(serialize_with = "compact_numbers")]
    pub midterm: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_students: usize,
    pub avg_score_monthly: Option<f64>,
    pub avg_score_midterm: Option<f64>,
    pub score_distribution: ScoreDistribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mover {
    pub name: Option<String>,
    pub class: Option<String>,
    #[serde(serialize_with = "compact_number")]
    pub improvement_school_rank: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectRank {
    pub name: String,
    pub rank_monthly: i64,
    pub rank_midterm: i64,
    pub change: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentCard {
    pub name: Option<String>,
    pub student_id: String,
    pub class: Option<String>,
    #[serde(serialize_with = "compact_number")]
    pub total_score_monthly: f64,
    #[serde(serialize_with = "compact_number")]
    pub total_score_midterm: f64,
    #[serde(serialize_with = "compact_number")]
    pub total_rank_monthly: f64,
    #[serde(serialize_with = "compact_number")]
    pub total_rank_midterm: f64,
    #[serde(serialize_with = "compact_number")]
    pub rank_change: f64,
    pub subjects: Vec<SubjectRank>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub global_stats: GlobalStats,
    pub subject_stats: Vec<SubjectSummary>,
    pub class_stats: Vec<ClassSummary>,
    pub top_improvers: Vec<Mover>,
    pub bottom_improvers: Vec<Mover>,
    pub students: Vec<StudentCard>,
}

pub fn build_dashboard(
    joined: &JoinedTable,
    class_stats: &[ClassSummary],
    subject_stats: &[SubjectSummary],
    config: &AnalysisConfig,
) -> Dashboard {
    let t = &joined.table;
    let monthly_total = t.numbers(&joined.monthly("total_score")).unwrap_or_default();
    let midterm_total = t.numbers(&joined.midterm("total_score")).unwrap_or_default();

    let global_stats = GlobalStats {
        total_students: joined.len(),
        avg_score_monthly: mean(monthly_total.iter().copied()),
        avg_score_midterm: mean(midterm_total.iter().copied()),
        score_distribution: ScoreDistribution {
            monthly: monthly_total.iter().flatten().copied().collect(),
            midterm: midterm_total.iter().flatten().copied().collect(),
        },
    };

    let mut class_stats = class_stats.to_vec();
    class_stats.sort_by(|a, b| crate::summary::compare_class_keys(&a.class_name, &b.class_name));

    let (top_improvers, bottom_improvers) = movers(joined, config.top_n);

    let students = (0..joined.len())
        .filter_map(|row| student_card(joined, row, config))
        .collect();

    Dashboard {
        global_stats,
        subject_stats: subject_stats.to_vec(),
        class_stats,
        top_improvers,
        bottom_improvers,
        students,
    }
}

/// Largest and smallest school-rank improvements. Ties keep row order.
fn movers(joined: &JoinedTable, n: usize) -> (Vec<Mover>, Vec<Mover>) {
    let t = &joined.table;
    let name_col = joined.midterm("name");
    let class_col = joined.midterm("class_name");

    let ranked: Vec<Mover> = (0..joined.len())
        .filter_map(|row| {
            Some(Mover {
                name: t.text(row, &name_col),
                class: t.text(row, &class_col),
                improvement_school_rank: t.number(row, IMPROVEMENT_SCHOOL_RANK)?,
            })
        })
        .collect();

    let by_improvement =
        |a: &Mover, b: &Mover| a.improvement_school_rank.partial_cmp(&b.improvement_school_rank);

    let mut top = ranked.clone();
    top.sort_by(|a, b| by_improvement(b, a).unwrap_or(Ordering::Equal));
    top.truncate(n);

    let mut bottom = ranked;
    bottom.sort_by(|a, b| by_improvement(a, b).unwrap_or(Ordering::Equal));
    bottom.truncate(n);

    (top, bottom)
}

fn rank_or_zero(v: Option<f64>) -> i64 {
    v.map(|r| r.trunc() as i64).unwrap_or(0)
}

fn student_card(joined: &JoinedTable, row: usize, config: &AnalysisConfig) -> Option<StudentCard> {
    let t = &joined.table;
    let num = |col: String| t.number(row, &col);

    let joint_monthly = num(joined.monthly("total_joint_rank"));
    let joint_midterm = num(joined.midterm("total_joint_rank"));
    let rank_change = match (joint_monthly, joint_midterm) {
        (Some(a), Some(b)) => a - b,
        _ => 0.0,
    };

    let subjects = config
        .subjects
        .iter()
        .map(|s| {
            let rank = AnalysisConfig::joint_rank_column(s);
            let rank_monthly = rank_or_zero(num(joined.monthly(&rank)));
            let rank_midterm = rank_or_zero(num(joined.midterm(&rank)));
            let change = if rank_monthly > 0 && rank_midterm > 0 {
                rank_monthly - rank_midterm
            } else {
                0
            };
            SubjectRank {
                name: s.clone(),
                rank_monthly,
                rank_midterm,
                change,
            }
        })
        .collect();

    Some(StudentCard {
        name: t.text(row, &joined.midterm("name")),
        student_id: t.text(row, crate::dataset::JOIN_KEY)?,
        class: t.text(row, &joined.midterm("class_name")),
        total_score_monthly: num(joined.monthly("total_score")).unwrap_or(0.0),
        total_score_midterm: num(joined.midterm("total_score")).unwrap_or(0.0),
        total_rank_monthly: joint_monthly.unwrap_or(0.0),
        total_rank_midterm: joint_midterm.unwrap_or(0.0),
        rank_change,
        subjects,
    })
}

impl Dashboard {
    /// Compact JSON with non-ASCII text left unescaped.
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("failed to serialize dashboard")
    }
}

/// Writes through a sibling temp file and renames, so readers never see a partial file.
pub fn write_dashboard_json(dashboard: &Dashboard, out_path: &Path) -> anyhow::Result<()> {
    let text = dashboard.to_json_string()?;
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let tmp = out_path.with_extension("json.writing");
    {
        let mut f = std::fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
        f.write_all(text.as_bytes())
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        f.flush().context("failed to flush dashboard json")?;
    }
    std::fs::rename(&tmp, out_path).with_context(|| {
        format!(
            "failed to move dashboard json to {}",
            out_path.to_string_lossy()
        )
    })?;
    info!(path = %out_path.display(), bytes = text.len(), "wrote dashboard json");
    Ok(())
}
