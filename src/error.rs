//! Error taxonomy for an analysis run.
//!
//! Only stage-level failures are errors. Missing columns, rejected rows, unparseable
//! numbers and empty joins degrade to omitted output instead.

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{label} source unavailable: {reason}")]
    SourceUnavailable { label: String, reason: String },

    #[error("{0}")]
    BadParams(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("no analysis has been run yet")]
    NoAnalysis,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl PipelineError {
    pub fn source_unavailable(label: &str, reason: impl Into<String>) -> Self {
        PipelineError::SourceUnavailable {
            label: label.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable { .. } => "source_unavailable",
            PipelineError::BadParams(_) => "bad_params",
            PipelineError::NoWorkspace => "no_workspace",
            PipelineError::NoAnalysis => "no_analysis",
            PipelineError::Storage(_) => "db_query_failed",
            PipelineError::Export(_) => "export_failed",
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}
