use crate::config::{AnalysisConfig, SETTINGS_KEY};
use crate::dashboard::{build_dashboard, Dashboard};
use crate::join::JoinedTable;
use crate::pipeline::AnalysisOutput;
use crate::summary::{ClassSummary, SubjectSummary};
use crate::table::{Table, Value};
use anyhow::Context;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use tracing::{info, warn};

pub const DB_FILE: &str = "analysis.sqlite3";

pub const STUDENT_COMPARISON_TABLE: &str = "student_comparison";
pub const CLASS_SUMMARY_TABLE: &str = "class_summary";
pub const SUBJECT_SUMMARY_TABLE: &str = "subject_summary";

pub const RESULT_TABLES: [&str; 3] = [
    STUDENT_COMPARISON_TABLE,
    CLASS_SUMMARY_TABLE,
    SUBJECT_SUMMARY_TABLE,
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS analysis_runs(
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            monthly_label TEXT NOT NULL,
            midterm_label TEXT NOT NULL,
            student_count INTEGER NOT NULL,
            config_json TEXT
        )",
        [],
    )?;
    ensure_analysis_runs_config_column(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_runs_created ON analysis_runs(created_at)",
        [],
    )?;

    // The comparison table's columns depend on the exports, so it is recreated per run.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_summary(
            class_name TEXT NOT NULL,
            avg_score_monthly REAL,
            avg_score_midterm REAL,
            avg_score_change REAL,
            avg_rank_improvement REAL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_summary(
            subject TEXT NOT NULL,
            avg_score_monthly REAL,
            avg_score_midterm REAL,
            delta REAL
        )",
        [],
    )?;

    Ok(conn)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// Workspaces created before runs recorded their config.
fn ensure_analysis_runs_config_column(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "analysis_runs", "config_json")? {
        conn.execute("ALTER TABLE analysis_runs ADD COLUMN config_json TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is invalid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored config, or the default when none was saved or the saved value no longer parses.
pub fn load_config(conn: &Connection) -> anyhow::Result<AnalysisConfig> {
    let Some(saved) = settings_get_json(conn, SETTINGS_KEY)? else {
        return Ok(AnalysisConfig::default());
    };
    match serde_json::from_value(saved) {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            warn!(error = %e, "stored analysis config no longer parses, using defaults");
            Ok(AnalysisConfig::default())
        }
    }
}

pub fn save_config(conn: &Connection, config: &AnalysisConfig) -> anyhow::Result<()> {
    settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(config)?)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Missing => SqlValue::Null,
        Value::Number(n) => SqlValue::Real(*n),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null | ValueRef::Blob(_) => Value::Missing,
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(f) => Value::number(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
    }
}

/// Replaces all three result tables and records the run with its config, in one transaction.
pub fn save_analysis(conn: &Connection, output: &AnalysisOutput) -> anyhow::Result<()> {
    let run_id = output.run_id.as_str();
    let joined = &output.joined;
    let classes = &output.classes;
    let subjects = &output.subjects;
    let config_json = serde_json::to_string(&output.config)?;

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        &format!("DROP TABLE IF EXISTS {}", STUDENT_COMPARISON_TABLE),
        [],
    )?;
    let cols = joined.table.columns();
    let col_list = cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    tx.execute(
        &format!("CREATE TABLE {}({})", STUDENT_COMPARISON_TABLE, col_list),
        [],
    )?;
    if !cols.is_empty() {
        let placeholders = std::iter::repeat("?")
            .take(cols.len())
            .collect::<Vec<_>>()
            .join(",");
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {}({}) VALUES({})",
            STUDENT_COMPARISON_TABLE, col_list, placeholders
        ))?;
        for row in joined.table.rows() {
            stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
        }
    }

    tx.execute("DELETE FROM class_summary", [])?;
    for c in classes {
        tx.execute(
            "INSERT INTO class_summary(class_name, avg_score_monthly, avg_score_midterm, avg_score_change, avg_rank_improvement)
             VALUES(?, ?, ?, ?, ?)",
            (
                &c.class_name,
                c.avg_score_monthly,
                c.avg_score_midterm,
                c.avg_score_change,
                c.avg_rank_improvement,
            ),
        )?;
    }

    tx.execute("DELETE FROM subject_summary", [])?;
    for s in subjects {
        tx.execute(
            "INSERT INTO subject_summary(subject, avg_score_monthly, avg_score_midterm, delta)
             VALUES(?, ?, ?, ?)",
            (&s.subject, s.avg_score_monthly, s.avg_score_midterm, s.delta),
        )?;
    }

    tx.execute(
        "INSERT INTO analysis_runs(id, created_at, monthly_label, midterm_label, student_count, config_json)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            run_id,
            chrono::Utc::now().to_rfc3339(),
            &joined.monthly_label,
            &joined.midterm_label,
            joined.len() as i64,
            config_json,
        ),
    )?;

    tx.commit()?;
    info!(
        run_id,
        students = joined.len(),
        classes = classes.len(),
        subjects = subjects.len(),
        "persisted analysis tables"
    );
    Ok(())
}

pub fn table_exists(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Reads a whole result table, columns in stored order.
pub fn load_table(conn: &Connection, name: &str) -> anyhow::Result<Table> {
    if !table_exists(conn, name)? {
        return Ok(Table::default());
    }
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut table = Table::new(columns);
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sql(r.get_ref(i)?));
        }
        table.push_row(values);
    }
    Ok(table)
}

fn run_config_fallback(monthly_label: &str, midterm_label: &str) -> AnalysisConfig {
    AnalysisConfig {
        monthly_label: monthly_label.to_string(),
        midterm_label: midterm_label.to_string(),
        ..AnalysisConfig::default()
    }
}

#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub run_id: String,
    /// The config the run was computed with.
    pub config: AnalysisConfig,
    pub joined: JoinedTable,
    pub classes: Vec<ClassSummary>,
    pub subjects: Vec<SubjectSummary>,
}

/// The latest persisted run, if any.
pub fn load_analysis(conn: &Connection) -> anyhow::Result<Option<StoredAnalysis>> {
    let run: Option<(String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, monthly_label, midterm_label, config_json
             FROM analysis_runs
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((run_id, monthly_label, midterm_label, config_json)) = run else {
        return Ok(None);
    };

    // Older runs have no recorded config; their labels are still known.
    let config = match config_json.as_deref().map(serde_json::from_str::<AnalysisConfig>) {
        Some(Ok(cfg)) => cfg,
        Some(Err(e)) => {
            warn!(run_id = %run_id, error = %e, "stored run config no longer parses, using defaults");
            run_config_fallback(&monthly_label, &midterm_label)
        }
        None => run_config_fallback(&monthly_label, &midterm_label),
    };

    let joined = JoinedTable {
        monthly_label,
        midterm_label,
        table: load_table(conn, STUDENT_COMPARISON_TABLE)?,
    };

    let mut stmt = conn.prepare(
        "SELECT class_name, avg_score_monthly, avg_score_midterm, avg_score_change, avg_rank_improvement
         FROM class_summary
         ORDER BY rowid",
    )?;
    let classes = stmt
        .query_map([], |r| {
            Ok(ClassSummary {
                class_name: r.get(0)?,
                avg_score_monthly: r.get(1)?,
                avg_score_midterm: r.get(2)?,
                avg_score_change: r.get(3)?,
                avg_rank_improvement: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT subject, avg_score_monthly, avg_score_midterm, delta
         FROM subject_summary
         ORDER BY rowid",
    )?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(SubjectSummary {
                subject: r.get(0)?,
                avg_score_monthly: r.get(1)?,
                avg_score_midterm: r.get(2)?,
                delta: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(StoredAnalysis {
        run_id,
        config,
        joined,
        classes,
        subjects,
    }))
}

impl StoredAnalysis {
    pub fn dashboard(&self) -> Dashboard {
        build_dashboard(&self.joined, &self.classes, &self.subjects, &self.config)
    }
}
