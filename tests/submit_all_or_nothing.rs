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
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Fixture {
    class_id: String,
    subject_id: String,
    student_ids: Vec<String>,
}

fn seed(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> Fixture {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        stdin,
        reader,
        "s2",
        "classes.create",
        json!({ "name": "JSS 1" }),
    );
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();
    let subject = request_ok(
        stdin,
        reader,
        "s3",
        "subjects.create",
        json!({ "name": "Mathematics" }),
    );
    let subject_id = subject
        .get("id")
        .and_then(|v| v.as_str())
        .expect("subject id")
        .to_string();

    let mut student_ids = Vec::new();
    for (i, (last, first)) in [("Adeyemi", "Bola"), ("Chukwu", "Ngozi")].iter().enumerate() {
        let created = request_ok(
            stdin,
            reader,
            &format!("s4-{}", i),
            "students.create",
            json!({
                "classId": class_id,
                "lastName": last,
                "firstName": first,
                "arm": "A"
            }),
        );
        student_ids.push(
            created
                .get("id")
                .and_then(|v| v.as_str())
                .expect("student id")
                .to_string(),
        );
    }

    let _ = request_ok(
        stdin,
        reader,
        "s5",
        "rubric.put",
        json!({
            "tenantId": "tenant-1",
            "session": "2025/2026",
            "term": "first",
            "components": [
                { "name": "CA1", "maxScore": 20.0 },
                { "name": "Exam", "maxScore": 80.0 }
            ],
            "gradingScale": []
        }),
    );

    Fixture {
        class_id,
        subject_id,
        student_ids,
    }
}

fn submit_params(fixture: &Fixture, entries: serde_json::Value) -> serde_json::Value {
    json!({
        "actorId": "anyone",
        "role": "admin",
        "tenantId": "tenant-1",
        "classId": fixture.class_id,
        "subjectId": fixture.subject_id,
        "arm": "A",
        "session": "2025/2026",
        "term": "first",
        "entries": entries
    })
}

fn list_results(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    fixture: &Fixture,
) -> Vec<serde_json::Value> {
    let listed = request_ok(
        stdin,
        reader,
        id,
        "results.list",
        json!({
            "classId": fixture.class_id,
            "subjectId": fixture.subject_id,
            "session": "2025/2026",
            "term": "first"
        }),
    );
    listed
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array")
        .clone()
}

#[test]
fn one_invalid_entry_blocks_the_whole_submission() {
    let workspace = temp_dir("resultsd-submit-atomic");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fixture = seed(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "scoresheet.submit",
        submit_params(
            &fixture,
            json!([
                {
                    "studentId": fixture.student_ids[0],
                    "componentName": "CA1",
                    "rawScore": 18.0
                },
                {
                    "studentId": fixture.student_ids[1],
                    "componentName": "CA1",
                    "rawScore": 25.0
                }
            ]),
        ),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("score_range")
    );
    let violations = resp
        .pointer("/error/details/violations")
        .and_then(|v| v.as_array())
        .expect("violations");
    assert_eq!(violations.len(), 1);
    assert_eq!(
        violations[0].get("index").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        violations[0].get("code").and_then(|v| v.as_str()),
        Some("exceeds_max_score")
    );

    // The valid sibling entry was not committed either.
    assert!(list_results(&mut stdin, &mut reader, "2", &fixture).is_empty());
}

#[test]
fn unknown_component_and_negative_scores_are_rejected_not_clamped() {
    let workspace = temp_dir("resultsd-submit-reject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fixture = seed(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "scoresheet.submit",
        submit_params(
            &fixture,
            json!([
                {
                    "studentId": fixture.student_ids[0],
                    "componentName": "CA3",
                    "rawScore": 5.0
                },
                {
                    "studentId": fixture.student_ids[0],
                    "componentName": "Exam",
                    "rawScore": -1.0
                },
                {
                    "studentId": "no-such-student",
                    "componentName": "Exam",
                    "rawScore": 10.0
                }
            ]),
        ),
    );
    let violations = resp
        .pointer("/error/details/violations")
        .and_then(|v| v.as_array())
        .expect("violations");
    let codes: Vec<&str> = violations
        .iter()
        .map(|v| v.get("code").and_then(|c| c.as_str()).expect("code"))
        .collect();
    assert_eq!(
        codes,
        vec!["unknown_component", "negative_score", "unknown_student"]
    );
    assert!(list_results(&mut stdin, &mut reader, "2", &fixture).is_empty());
}

#[test]
fn valid_submission_persists_graded_snapshots() {
    let workspace = temp_dir("resultsd-submit-ok");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fixture = seed(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scoresheet.submit",
        submit_params(
            &fixture,
            json!([
                {
                    "studentId": fixture.student_ids[0],
                    "componentName": "CA1",
                    "rawScore": 18.0
                },
                {
                    "studentId": fixture.student_ids[0],
                    "componentName": "Exam",
                    "rawScore": 55.0
                },
                {
                    "studentId": fixture.student_ids[1],
                    "componentName": "Exam",
                    "rawScore": 38.0
                }
            ]),
        ),
    );
    assert_eq!(result.get("updated").and_then(|v| v.as_i64()), Some(2));

    let rows = list_results(&mut stdin, &mut reader, "2", &fixture);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("total").and_then(|v| v.as_f64()), Some(73.0));
    assert_eq!(rows[0].get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(rows[1].get("total").and_then(|v| v.as_f64()), Some(38.0));
    assert_eq!(rows[1].get("grade").and_then(|v| v.as_str()), Some("F"));
}
