use crate::dataset::ExamDataset;
use crate::db;
use crate::error::PipelineError;
use crate::ipc::error::{err, ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use crate::pipeline::{run_analysis, GridSource};
use crate::schema::SchemaNormalizer;
use crate::table::Table;
use rusqlite::Connection;
use serde_json::json;
use tracing::{error, info};

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| pipeline_err(&req.id, &PipelineError::NoWorkspace))
}

fn table_json(t: &Table) -> serde_json::Value {
    json!({
        "columns": t.columns(),
        "rows": t.rows(),
    })
}

fn handle_exam_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let label = req
        .params
        .get("label")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.monthly_label.clone());

    let grid = match GridSource::from_params(&label, Some(&req.params)).and_then(|s| s.load(&label)) {
        Ok(g) => g,
        Err(e) => return pipeline_err(&req.id, &e),
    };
    let normalized = match SchemaNormalizer::default().normalize(&label, &grid) {
        Ok(n) => n,
        Err(e) => return pipeline_err(&req.id, &e),
    };
    let flat_columns = normalized.flat_columns.clone();
    let rejected_rows = normalized.rejected_rows;
    let duplicate_rows = normalized.duplicate_rows;
    let dataset = ExamDataset::new(&label, normalized);

    ok(
        &req.id,
        json!({
            "label": label,
            "flatColumns": flat_columns,
            "columns": dataset.table().columns(),
            "rowCount": dataset.len(),
            "rejectedRows": rejected_rows,
            "duplicateRows": duplicate_rows,
            "records": dataset.records(&state.config),
        }),
    )
}

fn handle_analysis_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let config = state.config.clone();

    let monthly = GridSource::from_params("monthly", req.params.get("monthly"))
        .and_then(|s| s.load(&config.monthly_label));
    let midterm = GridSource::from_params("midterm", req.params.get("midterm"))
        .and_then(|s| s.load(&config.midterm_label));
    let (monthly, midterm) = match (monthly, midterm) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "analysis aborted");
            return pipeline_err(&req.id, &e);
        }
    };

    let output = match run_analysis(&config, &monthly, &midterm) {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "analysis aborted");
            return pipeline_err(&req.id, &e);
        }
    };

    let persisted = match state.db.as_ref() {
        Some(conn) => {
            if let Err(e) = db::save_analysis(conn, &output) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            true
        }
        None => false,
    };

    let result = json!({
        "runId": output.run_id,
        "monthlyCount": output.monthly_count,
        "midtermCount": output.midterm_count,
        "studentCount": output.joined.len(),
        "columns": output.joined.table.columns(),
        "classSummary": output.classes,
        "subjectSummary": output.subjects,
        "persisted": persisted,
    });
    info!(run_id = %output.run_id, students = output.joined.len(), "analysis complete");
    state.last_run = Some(output);
    ok(&req.id, result)
}

fn handle_analysis_tables(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut tables = serde_json::Map::new();
    for name in db::RESULT_TABLES {
        match db::load_table(conn, name) {
            Ok(t) => {
                tables.insert(name.to_string(), table_json(&t));
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, json!({ "tables": tables }))
}

fn handle_analysis_inspect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let limit = match req.params.get("limit") {
        None => 5,
        Some(v) if v.is_null() => 5,
        Some(v) => match v.as_u64() {
            Some(n) => n as usize,
            None => return err(&req.id, "bad_params", "limit must be a non-negative integer", None),
        },
    };

    let mut out = Vec::new();
    for name in db::RESULT_TABLES {
        let t = match db::load_table(conn, name) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let head: Vec<serde_json::Value> = (0..t.row_count().min(limit))
            .map(|r| serde_json::Value::Object(t.row_json(r)))
            .collect();
        out.push(json!({
            "table": name,
            "shape": [t.row_count(), t.columns().len()],
            "columns": t.columns(),
            "head": head,
        }));
    }
    ok(&req.id, json!({ "tables": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exam.preview" => Some(handle_exam_preview(state, req)),
        "analysis.run" => Some(handle_analysis_run(state, req)),
        "analysis.tables" => Some(handle_analysis_tables(state, req)),
        "analysis.inspect" => Some(handle_analysis_inspect(state, req)),
        _ => None,
    }
}
