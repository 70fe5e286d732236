use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::dashboard::Dashboard;
use crate::db::DB_FILE;

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const DATA_ENTRY: &str = "data.json";
pub const DB_ENTRY: &str = "db/analysis.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "examdiff-dashboard-v1";

#[derive(Debug, Clone)]
pub struct BundleSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub data_sha256: String,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Packs the dashboard document, a manifest and (when present) the workspace database.
/// The archive is assembled beside `out_path` and renamed into place when complete.
pub fn export_dashboard_bundle(
    dashboard: &Dashboard,
    run_id: &str,
    workspace_path: Option<&Path>,
    out_path: &Path,
) -> anyhow::Result<BundleSummary> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let data = dashboard.to_json_string()?;
    let data_sha256 = sha256_hex(data.as_bytes());

    let db_path = workspace_path.map(|w| w.join(DB_FILE)).filter(|p| p.is_file());

    let tmp_path = out_path.with_extension("zip.writing");
    let out_file = File::create(&tmp_path).with_context(|| {
        format!(
            "failed to create output file {}",
            tmp_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "runId": run_id,
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dataSha256": data_sha256,
        "students": dashboard.global_stats.total_students,
        "includesDatabase": db_path.is_some(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DATA_ENTRY, opts)
        .context("failed to start data entry")?;
    zip.write_all(data.as_bytes())
        .context("failed to write data entry")?;

    let mut entry_count = 2;
    if let Some(db_path) = &db_path {
        zip.start_file(DB_ENTRY, opts)
            .context("failed to start database entry")?;
        let mut db_file = File::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
        std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;
        entry_count += 1;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    if out_path.exists() {
        std::fs::remove_file(out_path).with_context(|| {
            format!(
                "failed to remove existing bundle {}",
                out_path.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_path, out_path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        anyhow!(
            "failed to move bundle to {}: {}",
            out_path.to_string_lossy(),
            e
        )
    })?;

    info!(path = %out_path.display(), entry_count, "wrote dashboard bundle");
    Ok(BundleSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
        data_sha256,
    })
}
