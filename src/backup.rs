use crate::db::DB_FILE;
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
pub const BUNDLE_FORMAT: &str = "gradebook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub exported_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("invalid bundle: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl BundleError {
    pub fn code(&self) -> &'static str {
        match self {
            BundleError::Invalid(_) => "bundle_invalid",
            BundleError::Io(_) => "io_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn export_workspace_bundle(workspace_path: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = chrono::Utc::now().to_rfc3339();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        exported_at,
    })
}

/// Validates the bundle and swaps the workspace database in place.
/// The caller must have closed its connection to the workspace first.
pub fn import_workspace_bundle(in_path: &Path, workspace_path: &Path) -> Result<ImportSummary, BundleError> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file)
        .map_err(|e| BundleError::Invalid(format!("not a zip archive: {}", e)))?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .map_err(|_| BundleError::Invalid("missing manifest.json".to_string()))?
        .read_to_string(&mut manifest_text)
        .map_err(|e| BundleError::Invalid(format!("unreadable manifest.json: {}", e)))?;
    let manifest: serde_json::Value = serde_json::from_str(&manifest_text)
        .map_err(|e| BundleError::Invalid(format!("manifest.json is invalid JSON: {}", e)))?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(BundleError::Invalid(format!(
            "unsupported bundle format: {}",
            format
        )));
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BundleError::Invalid("manifest missing dbSha256".to_string()))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .map_err(|_| BundleError::Invalid(format!("missing {}", DB_ENTRY)))?
        .read_to_end(&mut db_bytes)
        .map_err(|e| BundleError::Invalid(format!("unreadable database entry: {}", e)))?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        return Err(BundleError::Invalid(format!(
            "database checksum mismatch: manifest {} vs bundle {}",
            expected, actual
        )));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;
    let dst = workspace_path.join(DB_FILE);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE));
    {
        let mut out = File::create(&tmp_dst)
            .with_context(|| format!("failed to create {}", tmp_dst.to_string_lossy()))?;
        out.write_all(&db_bytes)
            .context("failed to write extracted database")?;
        out.flush().context("failed to flush extracted database")?;
    }
    std::fs::rename(&tmp_dst, &dst)
        .with_context(|| format!("failed to move extracted database to {}", dst.to_string_lossy()))?;

    Ok(ImportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256: actual,
    })
}
