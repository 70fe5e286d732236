mod test_support;

use examdiffd::bundle;
use examdiffd::config::AnalysisConfig;
use examdiffd::dashboard::write_dashboard_json;
use examdiffd::db;
use examdiffd::grid::RawGrid;
use examdiffd::pipeline::{run_analysis, AnalysisOutput};
use std::fs::File;
use std::io::Read;
use test_support::{fixture_path, temp_dir};

fn fixture_run(cfg: &AnalysisConfig) -> AnalysisOutput {
    let monthly =
        RawGrid::load_file("Monthly", &fixture_path("fixtures/grids/monthly.json")).expect("monthly");
    let midterm =
        RawGrid::load_file("Midterm", &fixture_path("fixtures/grids/midterm.json")).expect("midterm");
    run_analysis(cfg, &monthly, &midterm).expect("run analysis")
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("missing entry {}", name))
        .read_to_end(&mut out)
        .expect("read entry");
    out
}

#[test]
fn bundle_with_workspace_database() {
    let workspace = temp_dir("examdiff-bundle-ws");
    let out_dir = temp_dir("examdiff-bundle-out");
    let cfg = AnalysisConfig::default();
    let out = fixture_run(&cfg);
    {
        let conn = db::open_db(&workspace).expect("open db");
        db::save_analysis(&conn, &out).expect("save analysis");
    }

    let dashboard = out.dashboard();
    let bundle_path = out_dir.join("dashboard.zip");
    let summary =
        bundle::export_dashboard_bundle(&dashboard, &out.run_id, Some(&workspace), &bundle_path)
            .expect("export bundle");
    assert_eq!(summary.bundle_format, bundle::BUNDLE_FORMAT_V1);
    assert_eq!(summary.entry_count, 3);
    assert!(!bundle_path.with_extension("zip.writing").exists());

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    assert_eq!(archive.len(), 3);

    let manifest: serde_json::Value =
        serde_json::from_slice(&read_entry(&mut archive, bundle::MANIFEST_ENTRY)).expect("manifest json");
    assert_eq!(manifest["format"], bundle::BUNDLE_FORMAT_V1);
    assert_eq!(manifest["runId"], out.run_id.as_str());
    assert_eq!(manifest["students"], 7);
    assert_eq!(manifest["includesDatabase"], true);

    let data = read_entry(&mut archive, bundle::DATA_ENTRY);
    assert_eq!(bundle::sha256_hex(&data), summary.data_sha256);
    assert_eq!(manifest["dataSha256"], summary.data_sha256.as_str());

    let parsed: serde_json::Value = serde_json::from_slice(&data).expect("data json");
    assert_eq!(parsed["global_stats"]["total_students"], 7);

    let db_bytes = read_entry(&mut archive, bundle::DB_ENTRY);
    assert_eq!(
        db_bytes,
        std::fs::read(workspace.join(db::DB_FILE)).expect("read db")
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn bundle_without_workspace_skips_database() {
    let out_dir = temp_dir("examdiff-bundle-nows");
    let cfg = AnalysisConfig::default();
    let out = fixture_run(&cfg);
    let dashboard = out.dashboard();

    let bundle_path = out_dir.join("nested").join("dashboard.zip");
    let summary = bundle::export_dashboard_bundle(&dashboard, &out.run_id, None, &bundle_path)
        .expect("export bundle");
    assert_eq!(summary.entry_count, 2);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    assert!(archive.by_name(bundle::DB_ENTRY).is_err());
    let manifest: serde_json::Value =
        serde_json::from_slice(&read_entry(&mut archive, bundle::MANIFEST_ENTRY)).expect("manifest json");
    assert_eq!(manifest["includesDatabase"], false);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn data_json_matches_bundle_payload() {
    let out_dir = temp_dir("examdiff-data-json");
    let cfg = AnalysisConfig::default();
    let out = fixture_run(&cfg);
    let dashboard = out.dashboard();

    let json_path = out_dir.join("data.json");
    write_dashboard_json(&dashboard, &json_path).expect("write data.json");
    assert!(!json_path.with_extension("json.writing").exists());
    let written = std::fs::read(&json_path).expect("read data.json");

    let bundle_path = out_dir.join("dashboard.zip");
    let summary = bundle::export_dashboard_bundle(&dashboard, &out.run_id, None, &bundle_path)
        .expect("export bundle");
    assert_eq!(bundle::sha256_hex(&written), summary.data_sha256);

    let text = String::from_utf8(written).expect("utf8");
    assert!(text.contains("杨磊"));
    assert!(!text.contains("\\u"));

    let _ = std::fs::remove_dir_all(out_dir);
}
