use crate::config::AnalysisConfig;
use crate::dashboard::{build_dashboard, Dashboard};
use crate::dataset::ExamDataset;
use crate::error::{PipelineError, PipelineResult};
use crate::grid::RawGrid;
use crate::join::{DatasetJoiner, JoinedTable};
use crate::schema::SchemaNormalizer;
use crate::summary::{class_summaries, subject_summaries, ClassSummary, SubjectSummary};
use std::path::PathBuf;
use tracing::{info, info_span};

/// Where a decoded grid comes from.
#[derive(Debug, Clone)]
pub enum GridSource {
    Inline(serde_json::Value),
    File(PathBuf),
}

impl GridSource {
    /// Reads `{grid}` or `{gridPath}` from a request object.
    pub fn from_params(label: &str, raw: Option<&serde_json::Value>) -> PipelineResult<GridSource> {
        let Some(obj) = raw.and_then(|v| v.as_object()) else {
            return Err(PipelineError::BadParams(format!(
                "missing {} source object",
                label
            )));
        };
        if let Some(grid) = obj.get("grid").filter(|v| !v.is_null()) {
            return Ok(GridSource::Inline(grid.clone()));
        }
        if let Some(path) = obj.get("gridPath").and_then(|v| v.as_str()) {
            return Ok(GridSource::File(PathBuf::from(path)));
        }
        Err(PipelineError::BadParams(format!(
            "{} source needs grid or gridPath",
            label
        )))
    }

    pub fn load(&self, label: &str) -> PipelineResult<RawGrid> {
        match self {
            GridSource::Inline(v) => RawGrid::from_json(label, v),
            GridSource::File(p) => RawGrid::load_file(label, p),
        }
    }
}

pub fn load_exam(
    normalizer: &SchemaNormalizer,
    label: &str,
    grid: &RawGrid,
) -> PipelineResult<ExamDataset> {
    let normalized = normalizer.normalize(label, grid)?;
    Ok(ExamDataset::new(label, normalized))
}

/// The result of one analysis run. Immutable once built.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub run_id: String,
    /// The config the run was computed with. Later config changes do not apply to it.
    pub config: AnalysisConfig,
    pub monthly_count: usize,
    pub midterm_count: usize,
    pub joined: JoinedTable,
    pub classes: Vec<ClassSummary>,
    pub subjects: Vec<SubjectSummary>,
}

impl AnalysisOutput {
    pub fn dashboard(&self) -> Dashboard {
        build_dashboard(&self.joined, &self.classes, &self.subjects, &self.config)
    }
}

/// Normalize both exports, join, and summarize. Either grid failing aborts the whole run.
pub fn run_analysis(
    config: &AnalysisConfig,
    monthly: &RawGrid,
    midterm: &RawGrid,
) -> PipelineResult<AnalysisOutput> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let _span = info_span!("analysis", run_id = %run_id).entered();

    let normalizer = SchemaNormalizer::default();
    let monthly_ds = load_exam(&normalizer, &config.monthly_label, monthly)?;
    let midterm_ds = load_exam(&normalizer, &config.midterm_label, midterm)?;

    let joined = DatasetJoiner::new(config).join(&monthly_ds, &midterm_ds);
    if joined.is_empty() {
        info!("no student appears in both exams");
    }
    let classes = class_summaries(&joined);
    let subjects = subject_summaries(&joined, config);

    Ok(AnalysisOutput {
        run_id,
        config: config.clone(),
        monthly_count: monthly_ds.len(),
        midterm_count: midterm_ds.len(),
        joined,
        classes,
        subjects,
    })
}
