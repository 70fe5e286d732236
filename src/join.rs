//! Inner join of the two exams and the derived comparison columns.
//!
//! Deltas are later minus earlier. Rank improvements are earlier minus later, so a
//! positive value means the student moved up.

use crate::config::AnalysisConfig;
use crate::dataset::{ExamDataset, JOIN_KEY};
use crate::table::{Table, Value};
use std::collections::HashMap;
use tracing::info;

pub const DELTA_TOTAL_SCORE: &str = "delta_total_score";
pub const IMPROVEMENT_SCHOOL_RANK: &str = "improvement_school_rank";
pub const IMPROVEMENT_CLASS_RANK: &str = "improvement_class_rank";

pub fn subject_delta_column(subject: &str) -> String {
    format!("delta_{}", subject)
}

/// The joined comparison table. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub monthly_label: String,
    pub midterm_label: String,
    pub table: Table,
}

impl JoinedTable {
    pub fn monthly(&self, field: &str) -> String {
        format!("{}_{}", field, self.monthly_label)
    }

    pub fn midterm(&self, field: &str) -> String {
        format!("{}_{}", field, self.midterm_label)
    }

    pub fn len(&self) -> usize {
        self.table.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.row_count() == 0
    }
}

#[derive(Debug, Clone)]
pub struct DatasetJoiner<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> DatasetJoiner<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        DatasetJoiner { config }
    }

    pub fn join(&self, monthly: &ExamDataset, midterm: &ExamDataset) -> JoinedTable {
        let left = monthly.table();
        let right = midterm.table();

        let right_key = right.column_index(JOIN_KEY);
        let right_cols: Vec<usize> = (0..right.columns().len())
            .filter(|i| Some(*i) != right_key)
            .collect();

        let mut right_by_id: HashMap<String, usize> = HashMap::new();
        if right_key.is_some() {
            for row in 0..right.row_count() {
                if let Some(id) = right.text(row, JOIN_KEY) {
                    right_by_id.entry(id).or_insert(row);
                }
            }
        }

        let mut columns: Vec<String> = left.columns().to_vec();
        columns.extend(right_cols.iter().map(|i| right.columns()[*i].clone()));
        let mut merged = Table::new(columns);

        for (row, values) in left.rows().iter().enumerate() {
            let Some(id) = left.text(row, JOIN_KEY) else {
                continue;
            };
            let Some(&r) = right_by_id.get(&id) else {
                continue;
            };
            let mut out = values.clone();
            out.extend(right_cols.iter().map(|i| right.rows()[r][*i].clone()));
            merged.push_row(out);
        }

        let mut joined = JoinedTable {
            monthly_label: monthly.label().to_string(),
            midterm_label: midterm.label().to_string(),
            table: merged,
        };
        self.append_derived(&mut joined);
        joined.table = joined.table.select(&self.column_order(&joined));

        info!(
            monthly = monthly.len(),
            midterm = midterm.len(),
            joined = joined.len(),
            "joined exams on student id"
        );
        joined
    }

    fn append_derived(&self, joined: &mut JoinedTable) {
        let pairs: Vec<(String, String, String)> = [
            (DELTA_TOTAL_SCORE, "total_score", true),
            (IMPROVEMENT_SCHOOL_RANK, "total_school_rank", false),
            (IMPROVEMENT_CLASS_RANK, "total_class_rank", false),
        ]
        .into_iter()
        .map(|(name, field, later_minus_earlier)| {
            let (a, b) = (joined.midterm(field), joined.monthly(field));
            if later_minus_earlier {
                (name.to_string(), a, b)
            } else {
                (name.to_string(), b, a)
            }
        })
        .chain(self.config.subjects.iter().map(|s| {
            let score = AnalysisConfig::score_column(s);
            (
                subject_delta_column(s),
                joined.midterm(&score),
                joined.monthly(&score),
            )
        }))
        .collect();

        for (name, minuend, subtrahend) in pairs {
            if let Some(values) = difference(&joined.table, &minuend, &subtrahend) {
                joined.table.push_column(&name, values);
            }
        }
    }

    fn column_order(&self, joined: &JoinedTable) -> Vec<String> {
        let mut leading: Vec<String> = vec![
            JOIN_KEY.to_string(),
            joined.midterm("name"),
            joined.midterm("class_name"),
            joined.monthly("name"),
            joined.monthly("class_name"),
            joined.monthly("total_score"),
            joined.midterm("total_score"),
            DELTA_TOTAL_SCORE.to_string(),
            joined.monthly("total_school_rank"),
            joined.midterm("total_school_rank"),
            IMPROVEMENT_SCHOOL_RANK.to_string(),
            joined.monthly("total_class_rank"),
            joined.midterm("total_class_rank"),
            IMPROVEMENT_CLASS_RANK.to_string(),
        ];
        leading.retain(|c| joined.table.has_column(c));

        let rest: Vec<String> = joined
            .table
            .columns()
            .iter()
            .filter(|c| !leading.contains(c))
            .cloned()
            .collect();
        leading.extend(rest);
        leading
    }
}

/// Row-wise `minuend - subtrahend`, `None` when either column is absent.
fn difference(table: &Table, minuend: &str, subtrahend: &str) -> Option<Vec<Value>> {
    let a = table.numbers(minuend)?;
    let b = table.numbers(subtrahend)?;
    Some(
        a.into_iter()
            .zip(b)
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Value::number(a - b),
                _ => Value::Missing,
            })
            .collect(),
    )
}
