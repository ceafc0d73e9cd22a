use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
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
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
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
    let payload = json!({ "id": "t", "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn error_code(resp: &serde_json::Value) -> &str {
    assert_eq!(resp["ok"], false, "expected failure: {}", resp);
    resp["error"]["code"].as_str().unwrap_or("")
}

fn write_sheet(path: &Path, headers: &[&str], rows: &[Vec<&str>]) {
    let mut wb = rust_xlsxwriter::Workbook::new();
    let ws = wb.add_worksheet();
    for (c, h) in headers.iter().enumerate() {
        ws.write_string(0, c as u16, *h).expect("header");
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            if v.is_empty() {
                continue;
            }
            let (r, c) = (r as u32 + 1, c as u16);
            match v.parse::<f64>() {
                Ok(n) => ws.write_number(r, c, n).expect("number"),
                Err(_) => ws.write_string(r, c, *v).expect("string"),
            };
        }
    }
    wb.save(path).expect("save sheet");
}

fn write_enrollment(path: &Path) {
    write_sheet(
        path,
        &["District", "Block", "School_ID", "School", "Total_Students"],
        &[vec!["North", "B1", "501", "Hill", "4"]],
    );
}

fn tiny_jpeg(path: &Path) {
    let mut v = vec![0xFF, 0xD8];
    v.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x10, 0x00, 0x30, 3]);
    v.extend_from_slice(&[0; 9]);
    v.extend_from_slice(&[0xFF, 0xD9]);
    std::fs::write(path, v).expect("write jpeg");
}

fn zip_entry(archive: &Path, name: &str) -> Vec<u8> {
    let f = std::fs::File::open(archive).expect("open archive");
    let mut zip = zip::ZipArchive::new(f).expect("open zip archive");
    let mut out = Vec::new();
    zip.by_name(name)
        .expect("entry in archive")
        .read_to_end(&mut out)
        .expect("read entry");
    out
}

fn contains(hay: &[u8], needle: &[u8]) -> bool {
    hay.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn stages_are_enforced() {
    let workspace = temp_dir("rollcall-stages");
    let input = workspace.join("enrollment.xlsx");
    write_enrollment(&input);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let r = request(
        &mut stdin,
        &mut reader,
        "ids.generate",
        json!({ "inputPath": input.to_string_lossy() }),
    );
    assert_eq!(error_code(&r), "bad_state");

    let r = request(&mut stdin, &mut reader, "ids.export", json!({ "studentIdsPath": "x.xlsx" }));
    assert_eq!(error_code(&r), "bad_state");

    let r = request(
        &mut stdin,
        &mut reader,
        "attendance.generate",
        json!({ "namingFormat": "school_block", "outPath": workspace.to_string_lossy() }),
    );
    assert_eq!(error_code(&r), "bad_state");

    let r = request(&mut stdin, &mut reader, "attendance.preview", json!({}));
    assert_eq!(error_code(&r), "bad_state");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bad_configuration_and_inputs_are_reported() {
    let workspace = temp_dir("rollcall-bad-input");
    let broken = workspace.join("broken.xlsx");
    write_sheet(&broken, &["District", "Block", "School"], &[vec!["N", "B", "S"]]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let r = request(
        &mut stdin,
        &mut reader,
        "run.configure",
        json!({ "mode": "custom", "paramSet": "A12" }),
    );
    assert_eq!(error_code(&r), "bad_params");
    assert!(r["error"]["details"]["accepted"].is_array());

    let r = request(&mut stdin, &mut reader, "run.configure", json!({ "mode": "custom" }));
    assert_eq!(r["ok"], true);
    assert_eq!(r["result"]["idFormat"], "XXX X XXXX");

    let r = request(&mut stdin, &mut reader, "ids.generate", json!({}));
    assert_eq!(error_code(&r), "bad_params");

    let r = request(
        &mut stdin,
        &mut reader,
        "ids.generate",
        json!({ "inputPath": workspace.join("absent.xlsx").to_string_lossy() }),
    );
    assert_eq!(error_code(&r), "io_failed");

    let r = request(
        &mut stdin,
        &mut reader,
        "ids.generate",
        json!({ "inputPath": broken.to_string_lossy() }),
    );
    assert_eq!(error_code(&r), "bad_input");
    assert_eq!(r["error"]["details"]["column"], "School_ID");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn edited_roster_groups_by_extracted_grade_with_logo() {
    let workspace = temp_dir("rollcall-roster");
    let input = workspace.join("enrollment.xlsx");
    let roster = workspace.join("roster.xlsx");
    let logo = workspace.join("logo.jpg");
    let out = workspace.join("out").join("sheets.zip");
    write_enrollment(&input);
    tiny_jpeg(&logo);
    write_sheet(
        &roster,
        &["STUDENT ID", "Class", "School Name", "District Name", "Gender", "Section"],
        &[
            vec!["A-1", "Grade 5", "Hill", "North", "F", ""],
            vec!["A-2", "5", "Hill", "North", "M", ""],
            vec!["A-2", "5", "Hill", "North", "M", ""],
            vec!["A-3", "Grade 6", "Hill", "North", "F", ""],
        ],
    );
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let r = request(&mut stdin, &mut reader, "run.configure", json!({}));
    assert_eq!(r["ok"], true);
    let r = request(
        &mut stdin,
        &mut reader,
        "ids.generate",
        json!({ "inputPath": input.to_string_lossy() }),
    );
    assert_eq!(r["result"]["summary"]["students"], 4);

    let r = request(
        &mut stdin,
        &mut reader,
        "attendance.generate",
        json!({ "namingFormat": "{school}_{block}", "outPath": "" }),
    );
    assert_eq!(error_code(&r), "bad_params");

    let r = request(
        &mut stdin,
        &mut reader,
        "attendance.generate",
        json!({
            "namingFormat": "{school}_Grade{grade}",
            "outPath": out.to_string_lossy(),
            "rosterPath": roster.to_string_lossy(),
            "logoPath": logo.to_string_lossy(),
        }),
    );
    assert_eq!(r["ok"], true, "{}", r);
    assert_eq!(
        r["result"]["entries"],
        json!(["North/Hill_Grade5.pdf", "North/Hill_Grade6.pdf"])
    );
    assert!(out.is_file());

    let grade5 = zip_entry(&out, "North/Hill_Grade5.pdf");
    assert!(grade5.starts_with(b"%PDF-"));
    assert!(contains(&grade5, b"DCTDecode"));
    let pdf = lopdf::Document::load_mem(&grade5).expect("parse pdf");
    let first_page = pdf.get_pages().values().next().copied().expect("page");
    let content = pdf.get_page_content(first_page).expect("page content");
    assert!(contains(&content, b"(A-1)"));
    assert!(contains(&content, b"(A-2)"));
    assert!(!contains(&content, b"(A-3)"));

    let r = request(&mut stdin, &mut reader, "attendance.preview", json!({}));
    assert_eq!(r["result"]["entry"], "North/Hill_Grade5.pdf");
    assert_eq!(r["result"]["studentCount"], 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
