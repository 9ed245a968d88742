use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gradebookd"))
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    writeln!(
        stdin,
        "{}",
        json!({ "id": method, "method": method, "params": params })
    )
    .expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, method, params);
    assert_eq!(value["ok"], json!(true), "{} failed: {}", method, value);
    value["result"].clone()
}

const ROSTER: &str = "name,email,registrationId
Ana Souza,ANA@Example.com,2024001
\"Silva, Bruno\",bruno@example.com
,nobody@example.com
Carla,not-an-email
Dan
Ana Again,ana@example.com
";

#[test]
fn roster_import_reports_bad_lines_and_export_writes_grades() {
    let workspace = temp_dir("gradebook-roster-export");
    let roster_path = workspace.join("roster.csv");
    let csv_out = workspace.join("exports").join("grades.csv");
    std::fs::write(&roster_path, ROSTER).expect("write roster");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "classrooms.create",
        json!({ "name": "Importada", "classType": "Integradora" }),
    );
    let classroom_id = created["classroom"]["id"].as_str().expect("id").to_string();
    let entrega_n1 = created["activities"][2]["id"].as_str().expect("n1").to_string();
    let entrega_n2 = created["activities"][5]["id"].as_str().expect("n2").to_string();

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "roster.importCsv",
        json!({ "classroomId": classroom_id, "inPath": roster_path.to_string_lossy() }),
    );
    assert_eq!(imported["rowsParsed"], json!(3));
    assert_eq!(imported["studentsCreated"], json!(2));
    assert_eq!(imported["enrolled"], json!(2));
    assert_eq!(imported["alreadyEnrolled"], json!(1));
    let warning_lines: Vec<u64> = imported["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .filter_map(|w| w["line"].as_u64())
        .collect();
    assert_eq!(warning_lines, vec![4, 5, 6]);
    assert_eq!(imported["warnings"][0]["code"], json!("bad_name"));
    assert_eq!(imported["warnings"][1]["code"], json!("bad_email"));
    assert_eq!(imported["warnings"][2]["code"], json!("bad_columns"));

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "roster.list",
        json!({ "classroomId": classroom_id }),
    );
    let rows = roster["records"].as_array().expect("records");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["email"], json!("ana@example.com"));
    assert_eq!(rows[0]["registrationId"], json!("2024001"));
    assert_eq!(rows[0]["grades"].as_array().map(|g| g.len()), Some(6));
    let bruno = rows[1]["recordId"].as_str().expect("bruno").to_string();

    for activity in [&entrega_n1, &entrega_n2] {
        request_ok(
            &mut stdin,
            &mut reader,
            "grades.set",
            json!({
                "classroomId": classroom_id,
                "recordId": bruno,
                "activityId": activity,
                "score": 6
            }),
        );
    }

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "exchange.exportGradesCsv",
        json!({ "classroomId": classroom_id, "outPath": csv_out.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], json!(2));
    let text = std::fs::read_to_string(&csv_out).expect("read export");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "student_name,group_id,Análise+Benchmark,Solução Preliminar,Entrega N1,Checks,Caderno Técnico,Entrega N2,n1_total,n2_total,final_grade,situation"
    );
    assert_eq!(lines[1], "Ana Souza,,0,0,0,0,0,0,0,0,0,Reprovado");
    assert_eq!(lines[2], "\"Silva, Bruno\",,0,0,6,0,0,6,6,6,6,Prova Final");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_bundle_restores_snapshot_and_rejects_garbage() {
    let workspace = temp_dir("gradebook-bundle");
    let bundle = workspace.join("backups").join("ws.zip");
    let garbage = workspace.join("garbage.zip");
    std::fs::write(&garbage, b"definitely not a zip").expect("write garbage");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "classrooms.create",
        json!({ "name": "Antes", "classType": "Modular" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "workspace.exportBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!("gradebook-workspace-v1"));
    assert_eq!(exported["dbSha256"].as_str().map(|s| s.len()), Some(64));

    request_ok(
        &mut stdin,
        &mut reader,
        "classrooms.create",
        json!({ "name": "Depois", "classType": "Integradora" }),
    );
    let two = request_ok(&mut stdin, &mut reader, "classrooms.list", json!({}));
    assert_eq!(two["classrooms"].as_array().map(|c| c.len()), Some(2));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "workspace.importBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["dbSha256"], exported["dbSha256"]);
    let one = request_ok(&mut stdin, &mut reader, "classrooms.list", json!({}));
    let names: Vec<&str> = one["classrooms"]
        .as_array()
        .expect("classrooms")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Antes"]);

    let rejected = request(
        &mut stdin,
        &mut reader,
        "workspace.importBundle",
        json!({ "inPath": garbage.to_string_lossy() }),
    );
    assert_eq!(rejected["error"]["code"], json!("bundle_invalid"));
    let still_there = request_ok(&mut stdin, &mut reader, "classrooms.list", json!({}));
    assert_eq!(still_there["classrooms"].as_array().map(|c| c.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
