use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBJECTS: [&str; 7] = ["语文", "数学", "英语", "生物", "道德与法治", "历史", "地理"];

pub const SETTINGS_KEY: &str = "analysis.config";

/// Metric labels used in the second header row.
pub const METRIC_SCORE: &str = "分数";
pub const METRIC_JOINT_RANK: &str = "联考排名";
pub const METRIC_SCHOOL_RANK: &str = "学校排名";
pub const METRIC_CLASS_RANK: &str = "班级排名";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Ordered subject identifiers tracked by both exams.
    pub subjects: Vec<String>,
    pub monthly_label: String,
    pub midterm_label: String,
    /// How many students each of the top/bottom mover lists holds.
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            subjects: DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            monthly_label: "Monthly".to_string(),
            midterm_label: "Midterm".to_string(),
            top_n: 5,
        }
    }
}

impl AnalysisConfig {
    pub fn score_column(subject: &str) -> String {
        format!("{}_{}", subject, METRIC_SCORE)
    }

    pub fn joint_rank_column(subject: &str) -> String {
        format!("{}_{}", subject, METRIC_JOINT_RANK)
    }

    /// Applies the fields present in `raw`; absent or null fields keep their value.
    pub fn apply_update(&mut self, raw: &serde_json::Value) -> PipelineResult<()> {
        let Some(obj) = raw.as_object() else {
            return Err(PipelineError::BadParams("config must be an object".into()));
        };

        let mut next = self.clone();

        match obj.get("subjects") {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => {
                let Some(arr) = v.as_array() else {
                    return Err(PipelineError::BadParams(
                        "subjects must be an array of strings".into(),
                    ));
                };
                let mut subjects: Vec<String> = Vec::with_capacity(arr.len());
                for s in arr {
                    let Some(s) = s.as_str() else {
                        return Err(PipelineError::BadParams(
                            "subjects must contain only strings".into(),
                        ));
                    };
                    let t = s.trim();
                    if t.is_empty() {
                        return Err(PipelineError::BadParams(
                            "subjects must not contain empty names".into(),
                        ));
                    }
                    if !subjects.iter().any(|x| x == t) {
                        subjects.push(t.to_string());
                    }
                }
                next.subjects = subjects;
            }
        }

        for (key, slot) in [
            ("monthlyLabel", &mut next.monthly_label),
            ("midtermLabel", &mut next.midterm_label),
        ] {
            match obj.get(key) {
                None => {}
                Some(v) if v.is_null() => {}
                Some(v) => {
                    let label = v.as_str().map(str::trim).unwrap_or("");
                    if label.is_empty() || label.contains(char::is_whitespace) {
                        return Err(PipelineError::BadParams(format!(
                            "{} must be a non-empty word",
                            key
                        )));
                    }
                    *slot = label.to_string();
                }
            }
        }
        // Labels suffix stored column names, which SQLite compares case-insensitively.
        if next.monthly_label.eq_ignore_ascii_case(&next.midterm_label) {
            return Err(PipelineError::BadParams(
                "monthlyLabel and midtermLabel must differ (ignoring case)".into(),
            ));
        }

        match obj.get("topN") {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => {
                let Some(n) = v.as_u64().filter(|n| *n > 0) else {
                    return Err(PipelineError::BadParams(
                        "topN must be a positive integer".into(),
                    ));
                };
                next.top_n = n as usize;
            }
        }

        *self = next;
        Ok(())
    }
}
