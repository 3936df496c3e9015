use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use droidsms::config::build_artifact_layout;
use droidsms::models::{Attachment, CanonicalMessage, Direction, MessageType, SourceKind};
use droidsms::normalize::identity_key;
use droidsms::output::{CSV_COLUMNS, csv_record, render_csv, write_run_artifacts};
use droidsms::pipeline::{RecoveryOptions, recover};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn sample_message() -> CanonicalMessage {
    CanonicalMessage {
        direction: Direction::Outbound,
        peer: "+15551234".to_string(),
        timestamp_unix_ms: 1_700_000_000_123,
        date_sent_unix_ms: Some(1_700_000_000_000),
        body: "see \"you\", later\nbye".to_string(),
        message_type: MessageType::Mms,
        attachments: vec![
            Attachment {
                mime_type: "image/jpeg".to_string(),
                relative_path: Some("mms-attachments/abc-0.jpg".to_string()),
            },
            Attachment::placeholder(),
        ],
        recipients: vec!["5550001".to_string(), "5550002".to_string()],
        contact_name: Some("Bob".to_string()),
        location: None,
        flags: Vec::new(),
        source_kind: SourceKind::ForensicAgent,
        source_file: "/dump/agent_mmssms.db".to_string(),
        source_row: 3,
        identity_key: identity_key("+15551234", 1_700_000_000_123, MessageType::Mms, "see"),
    }
}

#[test]
fn header_lists_the_fixed_columns() {
    let csv = render_csv(&[]).expect("empty csv should render");
    let header_line = csv.strip_suffix("\r\n").expect("header ends with crlf");

    insta::assert_snapshot!(header_line, @"direction,peer,timestamp,body,messageType,attachmentPaths,sourceKind,sourceFile,dateSent,recipients,contactName,location");
    assert_eq!(header_line.split(',').count(), CSV_COLUMNS.len());
}

#[test]
fn record_fields_follow_column_order() {
    let record = csv_record(&sample_message()).expect("record should render");

    assert_eq!(record.len(), CSV_COLUMNS.len());
    assert_eq!(record[0], "outbound");
    assert_eq!(record[2], "2023-11-14T22:13:20.123Z");
    assert_eq!(record[4], "MMS");
    assert_eq!(record[5], "mms-attachments/abc-0.jpg;<unavailable>");
    assert_eq!(record[6], "forensic_agent");
    assert_eq!(record[8], "2023-11-14T22:13:20.000Z");
    assert_eq!(record[9], "5550001;5550002");
    assert_eq!(record[10], "Bob");
    assert_eq!(record[11], "");
}

#[test]
fn bodies_with_separators_are_quoted() {
    let csv = render_csv(&[sample_message()]).expect("csv should render");
    assert!(csv.contains(",\"see \"\"you\"\", later\nbye\","));
    assert!(csv.ends_with("\r\n"));
}

#[test]
fn run_artifacts_land_next_to_the_csv() {
    let out = unique_temp_dir("droidsms-csv-artifacts");
    let layout = build_artifact_layout(&out.join("export.csv"));
    let outcome = recover(
        &[],
        &[],
        &RecoveryOptions {
            output_dir: layout.output_dir.clone(),
            fail_fast: false,
        },
    )
    .expect("empty recovery should succeed");

    write_run_artifacts(&layout, &[sample_message()], &outcome.summary)
        .expect("artifacts should be written");

    let csv = std::fs::read_to_string(out.join("export.csv")).expect("csv written");
    assert_eq!(
        csv.matches("\r\n").count(),
        2,
        "embedded body newlines stay bare inside quotes"
    );
    assert!(out.join("export.summary.json").is_file());
    assert!(out.join("export.schema.json").is_file());
    assert!(
        !out.join("mms-attachments").exists(),
        "no parts means no attachments directory"
    );
}
