use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use droidsms::adapters::backup_agent::{encode_entities, encode_footer};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_OUTPUT_WRITE_FAILURE: i32 = 3;
const EXIT_USAGE_ERROR: i32 = 64;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

fn write_backup_folder(root: &Path) {
    let telephony = root.join("com.android.providers.telephony");
    std::fs::create_dir_all(&telephony).expect("backup folder should be creatable");
    let mut container = encode_entities([
        ("_id", Some(b"1".as_slice())),
        ("address", Some(b"555-1234".as_slice())),
        ("date", Some(b"1700000000000".as_slice())),
        ("type", Some(b"1".as_slice())),
        ("body", Some(b"hello".as_slice())),
    ]);
    container.extend(encode_footer());
    std::fs::write(telephony.join("1_sms_backup"), container).expect("backup file");
}

fn droidsms(temp: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_droidsms"))
        .arg("--home-dir")
        .arg(temp)
        .arg("--cwd")
        .arg(temp)
        .args(args)
        .output()
        .expect("command should execute")
}

#[test]
fn unknown_flags_exit_with_usage_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_droidsms"))
        .args(["extract", "--bogus"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn help_exits_successfully() {
    let status = Command::new(env!("CARGO_BIN_EXE_droidsms"))
        .arg("--help")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_SUCCESS));
}

#[test]
fn runtime_path_resolution_failures_exit_with_runtime_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_droidsms"))
        .args(["--home-dir", "relative", "extract"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}

#[test]
fn missing_backup_folder_exits_with_runtime_code() {
    let temp = unique_temp_dir("droidsms-exit-missing-folder");
    std::fs::create_dir_all(&temp).expect("temp dir should be creatable");

    let output = droidsms(&temp, &["extract", "--folder", "nowhere"]);

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("backup folder does not exist"),
        "stderr: {stderr}"
    );
}

#[test]
fn successful_extract_exits_zero_and_reports_stages() {
    let temp = unique_temp_dir("droidsms-exit-success");
    write_backup_folder(&temp.join("dump"));

    let output = droidsms(&temp, &["extract", "-f", "dump", "-o", "out/sms.csv"]);

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("extract: stage discover"), "stdout: {stdout}");
    assert!(stdout.contains("extract: complete messages=1"), "stdout: {stdout}");
    assert!(stdout.contains("droidsms: completed `extract` (exit_code=0)"));
    let csv = std::fs::read_to_string(temp.join("out/sms.csv")).expect("csv should exist");
    assert_eq!(csv.lines().count(), 2);
}

#[test]
fn unwritable_output_exits_with_output_write_code() {
    let temp = unique_temp_dir("droidsms-exit-unwritable");
    write_backup_folder(&temp.join("dump"));
    std::fs::write(temp.join("blocker"), "a file, not a directory").expect("blocker file");

    let output = droidsms(&temp, &["extract", "-f", "dump", "-o", "blocker/sms.csv"]);

    assert_eq!(output.status.code(), Some(EXIT_OUTPUT_WRITE_FAILURE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("output write failed"), "stderr: {stderr}");
}

#[test]
fn scan_lists_recognized_and_unsupported_files() {
    let temp = unique_temp_dir("droidsms-exit-scan");
    write_backup_folder(&temp.join("dump"));
    std::fs::write(temp.join("dump/phone.ab"), b"ANDROID BACKUP").expect("archive file");

    let output = droidsms(&temp, &["scan", "-f", "dump"]);

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("scan: format name=telephony_backup status=found count=1"));
    assert!(stdout.contains("scan: format name=vendor_logs_db status=not_found count=0"));
    assert!(stdout.contains("scan: unsupported format=android_ab_backup"));
    assert!(stdout.contains("scan: notable_location path="));
    assert!(stdout.contains("scan: complete files_seen=2 sources=1 unsupported=1"));
}
