//! Canonical column naming and value coercion for one exam export.

use crate::error::{PipelineError, PipelineResult};
use crate::grid::{Cell, RawGrid};
use crate::header::flatten_header;
use crate::table::{Table, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    StudentId,
    ExamId,
    ClassName,
    TotalScore,
    TotalJointRank,
    TotalSchoolRank,
    TotalClassRank,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::StudentId => "student_id",
            Field::ExamId => "exam_id",
            Field::ClassName => "class_name",
            Field::TotalScore => "total_score",
            Field::TotalJointRank => "total_joint_rank",
            Field::TotalSchoolRank => "total_school_rank",
            Field::TotalClassRank => "total_class_rank",
        }
    }

    /// Identity fields are kept as text even when the export stores them as numbers.
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            Field::Name | Field::StudentId | Field::ExamId | Field::ClassName
        )
    }
}

/// A column matches when its name contains every `contains` needle and no `excludes` needle.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub contains: &'static [&'static str],
    pub excludes: &'static [&'static str],
    pub field: Field,
}

impl ColumnRule {
    pub fn matches(&self, name: &str) -> bool {
        self.contains.iter().all(|n| name.contains(n))
            && !self.excludes.iter().any(|n| name.contains(n))
    }
}

/// Rules in priority order; the first match wins.
pub fn default_rules() -> Vec<ColumnRule> {
    vec![
        ColumnRule { contains: &["姓名"], excludes: &[], field: Field::Name },
        ColumnRule { contains: &["学号"], excludes: &[], field: Field::StudentId },
        ColumnRule { contains: &["考号"], excludes: &[], field: Field::ExamId },
        ColumnRule { contains: &["班级"], excludes: &["排名"], field: Field::ClassName },
        ColumnRule { contains: &["总分"], excludes: &["排名"], field: Field::TotalScore },
        ColumnRule { contains: &["总分", "联考排名"], excludes: &[], field: Field::TotalJointRank },
        ColumnRule { contains: &["总分", "学校排名"], excludes: &[], field: Field::TotalSchoolRank },
        ColumnRule { contains: &["总分", "班级排名"], excludes: &[], field: Field::TotalClassRank },
    ]
}

pub fn is_numeric_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("score") || lower.contains("rank") || name.contains("分数") || name.contains("排名")
}

/// One exam after flattening, renaming, row filtering and coercion. Not yet label-suffixed.
#[derive(Debug, Clone)]
pub struct NormalizedExam {
    pub flat_columns: Vec<String>,
    pub table: Table,
    pub rejected_rows: usize,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    rules: Vec<ColumnRule>,
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        SchemaNormalizer::new(default_rules())
    }
}

impl SchemaNormalizer {
    pub fn new(rules: Vec<ColumnRule>) -> Self {
        SchemaNormalizer { rules }
    }

    pub fn classify(&self, name: &str) -> Option<Field> {
        self.rules.iter().find(|r| r.matches(name)).map(|r| r.field)
    }

    /// Canonical names per column. A field claimed by an earlier column leaves later
    /// matches under their flattened name.
    pub fn canonical_columns(&self, flat: &[String]) -> Vec<(String, Option<Field>)> {
        let mut claimed: HashSet<Field> = HashSet::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(flat.len());
        for name in flat {
            let field = self.classify(name).filter(|f| claimed.insert(*f));
            let canonical = match field {
                Some(f) => f.as_str().to_string(),
                None => name.clone(),
            };
            if !taken.insert(canonical.clone()) {
                // A flattened name that collides with a canonical one stays distinguishable.
                let renamed = format!("{}_raw", name);
                taken.insert(renamed.clone());
                out.push((renamed, None));
                continue;
            }
            out.push((canonical, field));
        }
        out
    }

    pub fn normalize(&self, label: &str, grid: &RawGrid) -> PipelineResult<NormalizedExam> {
        let width = grid.width();
        let flat_columns = flatten_header(&grid.subjects, &grid.metrics, width);
        let columns = self.canonical_columns(&flat_columns);

        let name_idx = columns.iter().position(|(_, f)| *f == Some(Field::Name));
        let id_idx = columns.iter().position(|(_, f)| *f == Some(Field::StudentId));
        let (Some(name_idx), Some(id_idx)) = (name_idx, id_idx) else {
            return Err(PipelineError::source_unavailable(
                label,
                "header has no 姓名 (name) or 学号 (student id) column",
            ));
        };

        let numeric: Vec<bool> = columns
            .iter()
            .map(|(n, f)| !f.map(Field::is_identity).unwrap_or(false) && is_numeric_column(n))
            .collect();

        let mut table = Table::new(columns.iter().map(|(n, _)| n.clone()).collect());
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut rejected_rows = 0usize;
        let mut duplicate_rows = 0usize;

        static EMPTY: Cell = Cell::Empty;
        for raw in &grid.data {
            let cell = |i: usize| raw.get(i).unwrap_or(&EMPTY);
            let (Some(_), Some(student_id)) = (cell(name_idx).as_text(), cell(id_idx).as_text())
            else {
                rejected_rows += 1;
                continue;
            };
            if !seen_ids.insert(student_id) {
                duplicate_rows += 1;
                continue;
            }

            let row: Vec<Value> = (0..width)
                .map(|i| {
                    let c = cell(i);
                    if numeric[i] {
                        Value::from_opt(c.as_number())
                    } else if columns[i].1.map(Field::is_identity).unwrap_or(false) {
                        c.as_text().map(Value::Text).unwrap_or(Value::Missing)
                    } else {
                        match c {
                            Cell::Empty => Value::Missing,
                            Cell::Number(n) => Value::number(*n),
                            Cell::Text(_) => c.as_text().map(Value::Text).unwrap_or(Value::Missing),
                        }
                    }
                })
                .collect();
            table.push_row(row);
        }

        if duplicate_rows > 0 {
            warn!(label, duplicate_rows, "dropped repeated student ids, first row kept");
        }
        debug!(label, rejected_rows, "rows without name or student id dropped");
        info!(
            label,
            columns = table.columns().len(),
            rows = table.row_count(),
            "normalized exam"
        );

        Ok(NormalizedExam {
            flat_columns,
            table,
            rejected_rows,
            duplicate_rows,
        })
    }
}
