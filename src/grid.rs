use crate::error::{PipelineError, PipelineResult};
use std::path::Path;
use tracing::debug;

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Cell::Empty,
            serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            serde_json::Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Trimmed text form of the cell, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) if !n.is_finite() => None,
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

/// Integral numbers render without a fractional part so ids read back as typed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A decoded exam export: title row, subject row, metric row, then data rows.
#[derive(Debug, Clone)]
pub struct RawGrid {
    pub title: Vec<Cell>,
    pub subjects: Vec<Cell>,
    pub metrics: Vec<Cell>,
    pub data: Vec<Vec<Cell>>,
}

impl RawGrid {
    pub fn from_rows(label: &str, mut rows: Vec<Vec<Cell>>) -> PipelineResult<RawGrid> {
        if rows.len() < 3 {
            return Err(PipelineError::source_unavailable(
                label,
                format!("expected title and two header rows, got {} rows", rows.len()),
            ));
        }
        let data = rows.split_off(3);
        let mut it = rows.into_iter();
        let title = it.next().unwrap_or_default();
        let subjects = it.next().unwrap_or_default();
        let metrics = it.next().unwrap_or_default();
        Ok(RawGrid {
            title,
            subjects,
            metrics,
            data,
        })
    }

    /// Accepts either `{"rows": [[...], ...]}` or a bare array of rows.
    pub fn from_json(label: &str, v: &serde_json::Value) -> PipelineResult<RawGrid> {
        let rows = v
            .get("rows")
            .and_then(|r| r.as_array())
            .or_else(|| v.as_array())
            .ok_or_else(|| PipelineError::source_unavailable(label, "grid must be an array of rows"))?;

        let mut out: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let Some(cells) = row.as_array() else {
                return Err(PipelineError::source_unavailable(
                    label,
                    format!("row {} is not an array", i),
                ));
            };
            out.push(cells.iter().map(Cell::from_json).collect());
        }
        RawGrid::from_rows(label, out)
    }

    pub fn load_file(label: &str, path: &Path) -> PipelineResult<RawGrid> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::source_unavailable(
                label,
                format!("failed to read {}: {}", path.to_string_lossy(), e),
            )
        })?;
        let v: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::source_unavailable(
                label,
                format!("{} is not a JSON grid: {}", path.to_string_lossy(), e),
            )
        })?;
        let grid = RawGrid::from_json(label, &v)?;
        debug!(
            label,
            path = %path.display(),
            rows = grid.data.len(),
            "loaded grid file"
        );
        Ok(grid)
    }

    /// Widest row across both header rows and the data.
    pub fn width(&self) -> usize {
        self.data
            .iter()
            .map(Vec::len)
            .chain([self.subjects.len(), self.metrics.len()])
            .max()
            .unwrap_or(0)
    }
}
