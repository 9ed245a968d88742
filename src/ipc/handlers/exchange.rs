use crate::backup;
use crate::calc;
use crate::db;
use crate::ipc::helpers::{
    db_conn, ensure_rubric, load_records, query_failed, require_classroom, required_str, respond,
    scheme_for, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, ActivityBlock};
use crate::roster::csv_quote;
use crate::store::{SqliteStore, StudentDirectory};
use serde_json::json;
use std::path::PathBuf;

fn fmt_score(v: f64) -> String {
    v.to_string()
}

/// Distinct non-N1/N2 tags of the active rubric, in activity order.
fn subtotal_blocks(active: &[&Activity]) -> Vec<ActivityBlock> {
    let mut out: Vec<ActivityBlock> = Vec::new();
    for a in active {
        if !a.group.is_two_block() && !out.contains(&a.group) {
            out.push(a.group.clone());
        }
    }
    out
}

fn write_text(out_path: &str, text: &str) -> Result<(), HandlerErr> {
    let io_err = |e: std::io::Error| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    };
    let out = PathBuf::from(out_path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&out, text).map_err(io_err)
}

fn export_grades_csv(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let out_path = required_str(params, "outPath")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    let records = load_records(state, &classroom_id)?;
    let scheme = scheme_for(&classroom, &activities);
    let directory = SqliteStore::new(db_conn(state)?);

    let mut active: Vec<&Activity> = activities.iter().filter(|a| a.active).collect();
    active.sort_by_key(|a| a.order);
    let blocks = subtotal_blocks(&active);

    let mut header: Vec<String> = vec!["student_name".into(), "group_id".into()];
    header.extend(active.iter().map(|a| csv_quote(&a.name)));
    header.extend(blocks.iter().map(|b| csv_quote(&format!("{} Total", b))));
    header.extend(
        ["n1_total", "n2_total", "final_grade", "situation"]
            .iter()
            .map(|s| s.to_string()),
    );
    let mut csv = header.join(",");
    csv.push('\n');

    for r in &records {
        let name = directory
            .resolve(&r.student_id)
            .map_err(query_failed)?
            .map(|s| s.name)
            .unwrap_or_default();
        let report = calc::evaluate(&activities, &r.grades, scheme);

        let mut fields: Vec<String> = vec![
            csv_quote(&name),
            csv_quote(r.group_id.as_deref().unwrap_or("")),
        ];
        fields.extend(
            active
                .iter()
                .map(|a| r.entry(&a.id).map(|g| fmt_score(g.score)).unwrap_or_default()),
        );
        fields.extend(blocks.iter().map(|b| {
            report
                .subtotals
                .iter()
                .find(|s| s.block == *b)
                .map(|s| fmt_score(s.total))
                .unwrap_or_else(|| "0".to_string())
        }));
        match report.two_block {
            Some(t) => {
                fields.push(fmt_score(t.n1_total));
                fields.push(fmt_score(t.n2_total));
                fields.push(fmt_score(t.final_grade));
                fields.push(csv_quote(t.situation.as_str()));
            }
            None => fields.extend(std::iter::repeat(String::new()).take(4)),
        }
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }

    write_text(&out_path, &csv)?;
    tracing::info!(classroom_id = %classroom_id, rows = records.len(), path = %out_path, "grades exported");
    Ok(json!({ "ok": true, "rowsExported": records.len(), "path": out_path }))
}

fn export_bundle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = required_str(params, "outPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    tracing::info!(path = %out_path, "workspace bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "exportedAt": export.exported_at,
    }))
}

fn import_bundle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let in_path = required_str(params, "inPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handle before replacing file.
    state.db = None;
    let imported = backup::import_workspace_bundle(&src, &workspace_path);

    let conn = db::open_db(&workspace_path).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": workspace_path.to_string_lossy() }))
    })?;
    state.db = Some(conn);

    let summary = imported.map_err(|e| {
        HandlerErr::new(e.code(), format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    tracing::info!(path = %in_path, "workspace bundle imported");
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exchange.exportGradesCsv" => export_grades_csv(state, &req.params),
        "workspace.exportBundle" => export_bundle(state, &req.params),
        "workspace.importBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
