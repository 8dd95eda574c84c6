//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COURSE: &str = "../../courses/web-basics.toml";

fn coursegrade() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("coursegrade").unwrap();
    cmd.env_remove("COURSEGRADE_JS_EXECUTOR_URL")
        .env_remove("COURSEGRADE_PHP_EXECUTOR_URL")
        .env_remove("COURSEGRADE_TIMEOUT_MS");
    cmd
}

/// A grade command writing progress into `dir`.
fn grade(dir: &TempDir, task: &str) -> Command {
    let mut cmd = coursegrade();
    cmd.arg("grade")
        .arg("--course")
        .arg(COURSE)
        .arg("--task")
        .arg(task)
        .arg("--learner")
        .arg("ada")
        .arg("--progress")
        .arg(dir.path().join("progress.json"));
    cmd
}

fn write_submission(dir: &TempDir, files: &[(&str, &str)]) -> std::path::PathBuf {
    let root = dir.path().join("submission");
    for (name, content) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    root
}

#[test]
fn validate_course_file() {
    coursegrade()
        .arg("validate")
        .arg("--course")
        .arg(COURSE)
        .assert()
        .success()
        .stdout(predicate::str::contains("Web Basics (4 nodes, 3 tasks)"))
        .stdout(predicate::str::contains("All courses valid"));
}

#[test]
fn validate_directory() {
    coursegrade()
        .arg("validate")
        .arg("--course")
        .arg("../../courses")
        .assert()
        .success()
        .stdout(predicate::str::contains("Web Basics"));
}

#[test]
fn validate_nonexistent_file() {
    coursegrade()
        .arg("validate")
        .arg("--course")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_reports_authoring_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"[course]
id = "broken"
title = "Broken"

[[contents]]
id = "a"
step_order = 1

[[contents]]
id = "b"
step_order = 3

[[contents.test_cases]]
file_name = "notes.txt"
"#,
    )
    .unwrap();

    coursegrade()
        .arg("validate")
        .arg("--course")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("step_order gap between 1 and 3"))
        .stdout(predicate::str::contains("[a] WARNING: task has no test cases"))
        .stdout(predicate::str::contains("targets unsupported file notes.txt"));
}

#[test]
fn sample_code_fails_and_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "heading-text")
        .assert()
        .failure()
        .stdout(predicate::str::contains("output mismatch"))
        .stdout(predicate::str::contains("expected `Welcome`, got `Hello`"))
        .stdout(predicate::str::contains("FAILED: heading-text (1 of 1 cases failed)"));
}

#[test]
fn passing_submission_records_progress() {
    let dir = TempDir::new().unwrap();
    let submission = write_submission(&dir, &[("index.html", "<h1>  Welcome </h1>")]);

    grade(&dir, "heading-text")
        .arg("--submission")
        .arg(&submission)
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED: heading-text"))
        .stdout(predicate::str::contains("Next: red-title"));

    let raw = std::fs::read_to_string(dir.path().join("progress.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(records["ada_heading-text"]["isCompleted"], true);
    assert_eq!(records["ada_intro"]["isCompleted"], false);

    coursegrade()
        .arg("progress")
        .arg("--course")
        .arg(COURSE)
        .arg("--learner")
        .arg("ada")
        .arg("--progress")
        .arg(dir.path().join("progress.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("Unlocked sections: html\n"))
        .stdout(predicate::str::contains("Completed: 0 lessons, 1 tasks of 4 nodes"));
}

#[test]
fn style_submission_passes_as_single_file() {
    let dir = TempDir::new().unwrap();
    let css = dir.path().join("style.css");
    std::fs::write(&css, ".title { color: #f00; font-size: 32px }").unwrap();

    grade(&dir, "red-title")
        .arg("--ignore-locks")
        .arg("--submission")
        .arg(&css)
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED: red-title"));
}

#[test]
fn json_output_is_a_submission_report() {
    let dir = TempDir::new().unwrap();
    let output = grade(&dir, "red-title")
        .arg("--ignore-locks")
        .arg("--format")
        .arg("json")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["content_id"], "red-title");
    assert_eq!(report["learner_id"], "ada");
    assert_eq!(report["verdict"]["passed"], false);
    assert!(report["advance"].is_null());
    assert_eq!(report["verdict"]["diagnostics"].as_array().unwrap().len(), 1);
}

#[test]
fn locked_tasks_are_refused() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "red-title")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "content red-title is locked until the previous section is completed",
        ));

    let raw = std::fs::read_to_string(dir.path().join("progress.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(records["ada_red-title"]["isCompleted"], false);
}

#[test]
fn lessons_cannot_be_graded() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "intro")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a gradable task"));
}

#[test]
fn unknown_task_is_an_error() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no content nope in course web-basics"));
}

#[test]
fn unknown_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "heading-text")
        .arg("--format")
        .arg("xml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn scripts_without_a_service_fail_gracefully() {
    let dir = TempDir::new().unwrap();
    grade(&dir, "hello-js")
        .arg("--ignore-locks")
        .assert()
        .failure()
        .stdout(predicate::str::contains("no execution service configured for javascript"));
}

#[tokio::test(flavor = "multi_thread")]
async fn scripts_are_run_by_the_configured_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"output": "Hello, world!\n"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let submission = write_submission(&dir, &[("script.js", "console.log('Hello, world!')")]);

    grade(&dir, "hello-js")
        .arg("--ignore-locks")
        .arg("--submission")
        .arg(&submission)
        .env("COURSEGRADE_JS_EXECUTOR_URL", server.uri())
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED: hello-js"))
        .stdout(predicate::str::contains("Course complete!"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    coursegrade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created coursegrade.toml"))
        .stdout(predicate::str::contains("Created courses/example.toml"));

    assert!(dir.path().join("coursegrade.toml").exists());
    assert!(dir.path().join("courses/example.toml").exists());

    coursegrade()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--course")
        .arg("courses/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All courses valid"));

    coursegrade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    coursegrade()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("grade"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("progress"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_output() {
    coursegrade()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("coursegrade"));
}
