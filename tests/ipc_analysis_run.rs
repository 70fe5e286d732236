mod test_support;

use serde_json::json;
use test_support::{fixture_path, request, request_err, request_ok, spawn_sidecar, temp_dir};

fn fixture_sources() -> serde_json::Value {
    json!({
        "monthly": { "gridPath": fixture_path("fixtures/grids/monthly.json").to_string_lossy() },
        "midterm": { "gridPath": fixture_path("fixtures/grids/midterm.json").to_string_lossy() },
    })
}

#[test]
fn analysis_run_persists_and_feeds_dashboard() {
    let workspace = temp_dir("examdiff-ipc-run");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let run = request_ok(&mut stdin, &mut reader, "3", "analysis.run", fixture_sources());
    assert_eq!(run["monthlyCount"], 8);
    assert_eq!(run["midtermCount"], 8);
    assert_eq!(run["studentCount"], 7);
    assert_eq!(run["persisted"], true);
    assert_eq!(run["classSummary"].as_array().map(|a| a.len()), Some(4));
    assert_eq!(run["subjectSummary"][0]["subject"], "语文");
    let run_id = run["runId"].as_str().expect("runId").to_string();

    let dash = request_ok(&mut stdin, &mut reader, "4", "dashboard.get", json!({}));
    assert_eq!(dash["runId"], run_id.as_str());
    let d = &dash["dashboard"];
    assert_eq!(d["global_stats"]["total_students"], 7);
    assert_eq!(d["top_improvers"][0]["name"], "杨磊");
    assert_eq!(d["top_improvers"][0]["improvement_school_rank"], 11);
    assert_eq!(d["bottom_improvers"][0]["name"], "陈静");
    assert_eq!(d["students"].as_array().map(|a| a.len()), Some(7));

    let inspect = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "analysis.inspect",
        json!({ "limit": 2 }),
    );
    let tables = inspect["tables"].as_array().expect("tables");
    let names: Vec<&str> = tables.iter().filter_map(|t| t["table"].as_str()).collect();
    assert_eq!(names, vec!["student_comparison", "class_summary", "subject_summary"]);
    assert_eq!(tables[0]["shape"][0], 7);
    assert_eq!(tables[0]["head"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(tables[0]["head"][0]["student_id"], "2023001");
    assert_eq!(tables[1]["shape"], json!([4, 5]));

    let all = request_ok(&mut stdin, &mut reader, "6", "analysis.tables", json!({}));
    assert_eq!(
        all["tables"]["subject_summary"]["rows"].as_array().map(|a| a.len()),
        Some(3)
    );

    let out_json = workspace.join("out").join("data.json");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "dashboard.export",
        json!({ "outPath": out_json.to_string_lossy() }),
    );
    assert_eq!(exported["students"], 7);
    let text = std::fs::read_to_string(&out_json).expect("read data.json");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("parse data.json");
    assert_eq!(parsed, dash["dashboard"]);

    let out_zip = workspace.join("out").join("dashboard.zip");
    let bundled = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "dashboard.bundle",
        json!({ "outPath": out_zip.to_string_lossy() }),
    );
    assert_eq!(bundled["entryCount"], 3);
    assert!(out_zip.is_file());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn persisted_run_is_served_after_reselect() {
    let workspace = temp_dir("examdiff-ipc-reload");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let _ = request_ok(&mut stdin, &mut reader, "2", "analysis.run", fixture_sources());
        drop(stdin);
        let _ = child.wait();
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let dash = request_ok(&mut stdin, &mut reader, "2", "dashboard.get", json!({}));
    let d = &dash["dashboard"];
    assert_eq!(d["global_stats"]["total_students"], 7);
    let classes: Vec<&str> = d["class_stats"]
        .as_array()
        .expect("class_stats")
        .iter()
        .filter_map(|c| c["class_name"].as_str())
        .collect();
    assert_eq!(classes, vec!["1", "2", "3", "10"]);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn failures_report_stable_codes() {
    let workspace = temp_dir("examdiff-ipc-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let e = request_err(&mut stdin, &mut reader, "1", "dashboard.get", json!({}));
    assert_eq!(e["code"], "no_analysis");

    let e = request_err(&mut stdin, &mut reader, "2", "analysis.inspect", json!({}));
    assert_eq!(e["code"], "no_workspace");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "analysis.run",
        json!({
            "monthly": { "gridPath": fixture_path("fixtures/grids/monthly.json").to_string_lossy() },
            "midterm": { "gridPath": workspace.join("missing.json").to_string_lossy() },
        }),
    );
    assert_eq!(e["code"], "source_unavailable");
    assert_eq!(e["details"]["exam"], "Midterm");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "analysis.run",
        json!({ "monthly": {} }),
    );
    assert_eq!(e["code"], "bad_params");

    // Without a workspace the run still succeeds but is not persisted.
    let run = request_ok(&mut stdin, &mut reader, "5", "analysis.run", fixture_sources());
    assert_eq!(run["persisted"], false);
    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "dashboard.export",
        json!({}),
    );
    assert_eq!(e["code"], "bad_params");

    let resp = request(&mut stdin, &mut reader, "7", "grades.compute", json!({}));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_implemented");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn exam_preview_reports_normalized_records() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "exam.preview",
        json!({
            "label": "Midterm",
            "gridPath": fixture_path("fixtures/grids/midterm.json").to_string_lossy(),
        }),
    );
    assert_eq!(preview["label"], "Midterm");
    assert_eq!(preview["rowCount"], 8);
    assert_eq!(preview["rejectedRows"], 1);
    assert_eq!(preview["duplicateRows"], 0);
    assert_eq!(preview["flatColumns"][4], "总分_分数");
    let columns = preview["columns"].as_array().expect("columns");
    assert!(columns.iter().any(|c| c == "student_id"));
    assert!(columns.iter().any(|c| c == "total_score_Midterm"));
    assert_eq!(preview["records"][0]["studentId"], "2023002");
}
