mod test_support;

use examdiffd::config::AnalysisConfig;
use examdiffd::db;
use examdiffd::grid::RawGrid;
use examdiffd::pipeline::run_analysis;
use examdiffd::table::Value;
use test_support::{fixture_path, temp_dir};

fn fixture_run(cfg: &AnalysisConfig) -> examdiffd::pipeline::AnalysisOutput {
    let monthly =
        RawGrid::load_file("Monthly", &fixture_path("fixtures/grids/monthly.json")).expect("monthly");
    let midterm =
        RawGrid::load_file("Midterm", &fixture_path("fixtures/grids/midterm.json")).expect("midterm");
    run_analysis(cfg, &monthly, &midterm).expect("run analysis")
}

#[test]
fn result_tables_survive_reopen() {
    let workspace = temp_dir("examdiff-db-roundtrip");
    let cfg = AnalysisConfig::default();
    let out = fixture_run(&cfg);

    {
        let conn = db::open_db(&workspace).expect("open db");
        db::save_analysis(&conn, &out).expect("save analysis");
    }

    let conn = db::open_db(&workspace).expect("reopen db");
    let comparison = db::load_table(&conn, db::STUDENT_COMPARISON_TABLE).expect("load comparison");
    assert_eq!(comparison.columns(), out.joined.table.columns());
    assert_eq!(comparison.row_count(), 7);
    // Identity columns come back as text, not numbers.
    assert_eq!(
        comparison.value(0, "student_id"),
        &Value::Text("2023001".to_string())
    );
    assert_eq!(comparison.value(4, "delta_语文"), &Value::Missing);

    let classes = db::load_table(&conn, db::CLASS_SUMMARY_TABLE).expect("load classes");
    assert_eq!(classes.row_count(), 4);
    assert_eq!(classes.text(3, "class_name").as_deref(), Some("10"));

    let stored = db::load_analysis(&conn)
        .expect("load analysis")
        .expect("stored run");
    assert_eq!(stored.run_id, out.run_id);
    assert_eq!(stored.config, cfg);
    assert_eq!(stored.classes, out.classes);
    assert_eq!(stored.subjects, out.subjects);
    assert_eq!(stored.joined.len(), out.joined.len());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rerun_replaces_previous_tables() {
    let workspace = temp_dir("examdiff-db-rerun");
    let conn = db::open_db(&workspace).expect("open db");

    let cfg = AnalysisConfig::default();
    let first = fixture_run(&cfg);
    db::save_analysis(&conn, &first).expect("save first");

    let mut narrow = AnalysisConfig::default();
    narrow.subjects = vec!["数学".to_string()];
    let second = fixture_run(&narrow);
    db::save_analysis(&conn, &second).expect("save second");

    let subjects = db::load_table(&conn, db::SUBJECT_SUMMARY_TABLE).expect("load subjects");
    assert_eq!(subjects.row_count(), 1);
    assert_eq!(subjects.text(0, "subject").as_deref(), Some("数学"));

    let comparison = db::load_table(&conn, db::STUDENT_COMPARISON_TABLE).expect("load comparison");
    assert!(!comparison.has_column("delta_语文"));
    assert!(comparison.has_column("delta_数学"));

    let stored = db::load_analysis(&conn).expect("load").expect("stored");
    assert_eq!(stored.run_id, second.run_id);
    assert_eq!(stored.config, narrow);
    let d = stored.dashboard();
    assert_eq!(d.students[0].subjects.len(), 1);
    assert_eq!(d.students[0].subjects[0].name, "数学");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn fresh_workspace_has_no_analysis_and_default_config() {
    let workspace = temp_dir("examdiff-db-fresh");
    let conn = db::open_db(&workspace).expect("open db");
    assert!(db::load_analysis(&conn).expect("load").is_none());
    assert_eq!(db::load_config(&conn).expect("config"), AnalysisConfig::default());

    let mut cfg = AnalysisConfig::default();
    cfg.top_n = 3;
    db::save_config(&conn, &cfg).expect("save config");
    assert_eq!(db::load_config(&conn).expect("config").top_n, 3);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unreadable_stored_config_falls_back_to_defaults() {
    let workspace = temp_dir("examdiff-db-badcfg");
    let conn = db::open_db(&workspace).expect("open db");
    db::settings_set_json(
        &conn,
        examdiffd::config::SETTINGS_KEY,
        &serde_json::json!({ "topN": "many" }),
    )
    .expect("write setting");
    assert_eq!(db::load_config(&conn).expect("config"), AnalysisConfig::default());

    let _ = std::fs::remove_dir_all(workspace);
}
