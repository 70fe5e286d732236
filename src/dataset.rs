use crate::config::{
    AnalysisConfig, METRIC_CLASS_RANK, METRIC_JOINT_RANK, METRIC_SCHOOL_RANK, METRIC_SCORE,
};
use crate::schema::{Field, NormalizedExam};
use crate::table::Table;
use serde::Serialize;

pub const JOIN_KEY: &str = "student_id";

/// Per-student table for one exam. Every column but the join key carries `_{label}`.
#[derive(Debug, Clone)]
pub struct ExamDataset {
    label: String,
    table: Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetrics {
    pub subject: String,
    pub score: Option<f64>,
    pub joint_rank: Option<f64>,
    pub school_rank: Option<f64>,
    pub class_rank: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub student_id: String,
    pub name: String,
    pub class_name: Option<String>,
    pub exam_id: Option<String>,
    pub total_score: Option<f64>,
    pub total_joint_rank: Option<f64>,
    pub total_school_rank: Option<f64>,
    pub total_class_rank: Option<f64>,
    pub subjects: Vec<SubjectMetrics>,
}

impl ExamDataset {
    pub fn new(label: &str, normalized: NormalizedExam) -> Self {
        let mut table = normalized.table;
        table.rename_columns(|c| {
            if c == JOIN_KEY {
                c.to_string()
            } else {
                format!("{}_{}", c, label)
            }
        });
        ExamDataset {
            label: label.to_string(),
            table,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.row_count() == 0
    }

    /// Suffixed column name of an unsuffixed field in this dataset.
    pub fn column(&self, field: &str) -> String {
        if field == JOIN_KEY {
            field.to_string()
        } else {
            format!("{}_{}", field, self.label)
        }
    }

    pub fn record(&self, row: usize, config: &AnalysisConfig) -> Option<ExamRecord> {
        let t = &self.table;
        let num = |field: &str| t.number(row, &self.column(field));
        let text = |field: &str| t.text(row, &self.column(field));

        let subjects = config
            .subjects
            .iter()
            .map(|s| SubjectMetrics {
                subject: s.clone(),
                score: num(&format!("{}_{}", s, METRIC_SCORE)),
                joint_rank: num(&format!("{}_{}", s, METRIC_JOINT_RANK)),
                school_rank: num(&format!("{}_{}", s, METRIC_SCHOOL_RANK)),
                class_rank: num(&format!("{}_{}", s, METRIC_CLASS_RANK)),
            })
            .collect();

        Some(ExamRecord {
            student_id: text(Field::StudentId.as_str())?,
            name: text(Field::Name.as_str())?,
            class_name: text(Field::ClassName.as_str()),
            exam_id: text(Field::ExamId.as_str()),
            total_score: num(Field::TotalScore.as_str()),
            total_joint_rank: num(Field::TotalJointRank.as_str()),
            total_school_rank: num(Field::TotalSchoolRank.as_str()),
            total_class_rank: num(Field::TotalClassRank.as_str()),
            subjects,
        })
    }

    pub fn records(&self, config: &AnalysisConfig) -> Vec<ExamRecord> {
        (0..self.len())
            .filter_map(|row| self.record(row, config))
            .collect()
    }
}
