mod common;

use assert_cmd::Command;
use predicates::str::contains;

use common::{TestWorkspace, npy_i64_body, read_npy};

fn binary() -> Command {
    Command::cargo_bin("csv-paged").expect("binary exists")
}

#[test]
fn import_plans_and_writes_manifest_and_task_file() {
    let ws = TestWorkspace::new();
    let csv = ws.write("orders.csv", b"id,amount\n1,9.5\n2,12.25\n3,3.0\n");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "--dir",
            ws.path().to_str().unwrap(),
            "--page-size",
            "2",
            "--guess-dtypes",
        ])
        .assert()
        .success();

    let pages_dir = ws.path().join("pages");
    assert!(pages_dir.join("plan.json").exists());
    let tasks = std::fs::read_to_string(pages_dir.join("tasks.txt")).expect("tasks file");
    assert_eq!(tasks.lines().count(), 2);
    assert!(tasks.contains("task --pages"));
    // Planning alone materializes no pages.
    assert!(!pages_dir.join("0.npy").exists());
}

#[test]
fn import_execute_materializes_typed_pages() {
    let ws = TestWorkspace::new();
    let csv = ws.write("orders.csv", b"id,amount\n1,9.5\n2,12.25\n3,3.0\n");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "true",
            "false",
            "--dir",
            ws.path().to_str().unwrap(),
            "--guess-dtypes",
        ])
        .assert()
        .success();

    let pages_dir = ws.path().join("pages");
    assert_eq!(npy_i64_body(&pages_dir.join("0.npy")), [1, 2, 3]);
    let (dict, _) = read_npy(&pages_dir.join("1.npy"));
    assert!(dict.contains("'<f8'"));
}

#[test]
fn import_multiprocess_fans_out_through_a_line_runner() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"A\n1\n2\n3\n4\n");
    // `sh` consumes one worker command per line from stdin.
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "true",
            "true",
            "--runner",
            "sh",
            "--dir",
            ws.path().to_str().unwrap(),
            "--page-size",
            "2",
            "--guess-dtypes",
        ])
        .assert()
        .success();

    let pages_dir = ws.path().join("pages");
    assert_eq!(npy_i64_body(&pages_dir.join("0.npy")), [1, 2]);
    assert_eq!(npy_i64_body(&pages_dir.join("1.npy")), [3, 4]);
    assert!(pages_dir.join("tasks.txt").exists());
}

#[test]
fn task_subcommand_runs_a_single_slice() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"A,B\n1,x\n2,y\n");
    let page_a = ws.path().join("a.npy");
    let page_b = ws.path().join("b.npy");
    binary()
        .args([
            "--guess-dtypes",
            "task",
            "--pages",
            &format!("{},{}", page_a.display(), page_b.display()),
            "--fields",
            "0,1",
            csv.to_str().unwrap(),
            "4",
            "2",
        ])
        .assert()
        .success();
    assert_eq!(npy_i64_body(&page_a), [1, 2]);
    let (dict, _) = read_npy(&page_b);
    assert!(dict.contains("'<U1'"));
}

#[test]
fn missing_columns_fail_before_writing_anything() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"A,B\n1,2\n");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "--dir",
            ws.path().to_str().unwrap(),
            "--columns",
            "A,missing",
        ])
        .assert()
        .failure()
        .stderr(contains("Missing columns"));
    assert!(!ws.path().join("pages").join("plan.json").exists());
}

#[test]
fn empty_input_fails_with_end_of_file() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "--dir",
            ws.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("end of file"));
}

#[test]
fn utf16_import_honours_the_bom() {
    let ws = TestWorkspace::new();
    let csv = ws.write_utf16("data.csv", "A\n7\n8\n", true);
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "true",
            "false",
            "--encoding",
            "utf16",
            "--dir",
            ws.path().to_str().unwrap(),
            "--guess-dtypes",
        ])
        .assert()
        .success();
    assert_eq!(npy_i64_body(&ws.path().join("pages").join("0.npy")), [7, 8]);
}

#[test]
fn strict_mode_violations_exit_nonzero() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"A\n\"ab\"cd\n");
    let page = ws.path().join("a.npy");
    binary()
        .args([
            "--strict",
            "task",
            "--pages",
            page.to_str().unwrap(),
            "--fields",
            "0",
            csv.to_str().unwrap(),
            "2",
            "1",
        ])
        .assert()
        .failure();
}

#[test]
fn unknown_encoding_is_a_configuration_error() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.csv", b"A\n1\n");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "--encoding",
            "latin9",
            "--dir",
            ws.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("Unknown encoding"));
}

#[test]
fn tsv_extension_defaults_to_tab_delimiter() {
    let ws = TestWorkspace::new();
    let csv = ws.write("data.tsv", b"A\tB\n1\t2\n");
    binary()
        .args([
            "import",
            csv.to_str().unwrap(),
            "true",
            "false",
            "--dir",
            ws.path().to_str().unwrap(),
            "--guess-dtypes",
        ])
        .assert()
        .success();
    assert_eq!(npy_i64_body(&ws.path().join("pages").join("0.npy")), [1]);
    assert_eq!(npy_i64_body(&ws.path().join("pages").join("1.npy")), [2]);
}
