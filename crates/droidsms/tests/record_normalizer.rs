use std::path::Path;

use droidsms::RowRejection;
use droidsms::models::{
    Direction, MessageType, PartPayload, RawPart, RawRow, RawValue, SourceKind,
};
use droidsms::normalize::{identity_key, normalize_row};
use droidsms::utils::phone::PEER_UNNORMALIZED_FLAG;

fn text(value: &str) -> RawValue {
    RawValue::Text(value.to_string())
}

fn backup_bytes(value: &str) -> RawValue {
    RawValue::Bytes(value.as_bytes().to_vec())
}

fn vendor_row(logtype: i64) -> RawRow {
    RawRow::new(SourceKind::VendorLog, Path::new("/dump/logs.db"), 4)
        .with_value("_id", RawValue::Integer(5))
        .with_value("number", text("+1 (555) 123-4567"))
        .with_value("date", RawValue::Integer(1_700_000_000_000))
        .with_value("type", RawValue::Integer(1))
        .with_value("m_content", text("see you soon"))
        .with_value("name", text(" Alice "))
        .with_value("geocoded_location", text("Springfield"))
        .with_value("logtype", RawValue::Integer(logtype))
}

#[test]
fn vendor_call_rows_are_not_messages() {
    let rejection = normalize_row(&vendor_row(100)).expect_err("call log rows are rejected");
    assert_eq!(
        rejection,
        RowRejection::NotAMessage {
            reason: "logtype 100".to_string()
        }
    );
}

#[test]
fn vendor_sms_rows_carry_contact_and_location() {
    let message = normalize_row(&vendor_row(300)).expect("vendor sms should normalize");

    assert_eq!(message.message_type, MessageType::Sms);
    assert_eq!(message.direction, Direction::Inbound);
    assert_eq!(message.peer, "+15551234567");
    assert_eq!(message.timestamp_unix_ms, 1_700_000_000_000);
    assert_eq!(message.body, "see you soon");
    assert_eq!(message.contact_name.as_deref(), Some("Alice"));
    assert_eq!(message.location.as_deref(), Some("Springfield"));
    assert_eq!(message.source_kind, SourceKind::VendorLog);
    assert_eq!(message.source_file, "/dump/logs.db");
    assert_eq!(message.source_row, 4);
    assert!(message.flags.is_empty());
}

#[test]
fn vendor_mms_log_type_marks_mms() {
    let message = normalize_row(&vendor_row(200)).expect("vendor mms should normalize");
    assert_eq!(message.message_type, MessageType::Mms);
    assert_eq!(message.timestamp_unix_ms, 1_700_000_000_000);
}

#[test]
fn bad_timestamps_reject_the_row() {
    let base = || {
        RawRow::new(
            SourceKind::BackupAgent,
            Path::new("/dump/1_sms_backup"),
            0,
        )
        .with_value("_id", backup_bytes("1"))
        .with_value("address", backup_bytes("555"))
    };

    for (raw, expected) in [
        (Some("yesterday"), "yesterday"),
        (Some("0"), "0"),
        (Some("-20"), "-20"),
        (None, ""),
    ] {
        let row = match raw {
            Some(raw) => base().with_value("date", backup_bytes(raw)),
            None => base(),
        };
        let rejection = normalize_row(&row).expect_err("bad timestamp must reject");
        assert_eq!(
            rejection,
            RowRejection::UnparseableTimestamp {
                column: "date".to_string(),
                raw: expected.to_string(),
            }
        );
    }
}

#[test]
fn timestamps_past_the_calendar_range_reject_the_row() {
    let row = RawRow::new(SourceKind::BackupAgent, Path::new("/dump/1_sms_backup"), 1)
        .with_value("_id", backup_bytes("2"))
        .with_value("address", backup_bytes("555"))
        .with_value("date", backup_bytes("900000000000000000"));
    assert_eq!(
        normalize_row(&row).expect_err("unrepresentable timestamp must reject"),
        RowRejection::UnparseableTimestamp {
            column: "date".to_string(),
            raw: "900000000000000000".to_string(),
        }
    );

    let stored_millis = RawRow::new(SourceKind::BackupAgent, Path::new("/dump/1_mms_backup"), 0)
        .with_value("_id", backup_bytes("3"))
        .with_value("address", backup_bytes("555"))
        .with_value("date", backup_bytes("1700000000000"));
    assert!(matches!(
        normalize_row(&stored_millis),
        Err(RowRejection::UnparseableTimestamp { .. })
    ));
}

#[test]
fn unrepresentable_date_sent_is_dropped_not_fatal() {
    let row = RawRow::new(SourceKind::BackupAgent, Path::new("/dump/1_sms_backup"), 0)
        .with_value("_id", backup_bytes("1"))
        .with_value("address", backup_bytes("555"))
        .with_value("date", backup_bytes("1000"))
        .with_value("date_sent", backup_bytes("900000000000000000"));

    let message = normalize_row(&row).expect("row with a bad date_sent still normalizes");
    assert_eq!(message.timestamp_unix_ms, 1_000);
    assert_eq!(message.date_sent_unix_ms, None);
}

#[test]
fn sender_ids_keep_their_text_and_get_flagged() {
    let row = RawRow::new(SourceKind::BackupAgent, Path::new("/dump/1_sms_backup"), 0)
        .with_value("_id", backup_bytes("1"))
        .with_value("address", backup_bytes("Vodafone"))
        .with_value("date", backup_bytes("1000"))
        .with_value("type", backup_bytes("1"));

    let message = normalize_row(&row).expect("sender id row should normalize");
    assert_eq!(message.peer, "Vodafone");
    assert_eq!(message.flags, vec![PEER_UNNORMALIZED_FLAG.to_string()]);
}

#[test]
fn multi_address_fields_split_into_peer_and_recipients() {
    let row = RawRow::new(
        SourceKind::ForensicAgent,
        Path::new("/dump/agent_mmssms.db"),
        0,
    )
    .with_value("_id", RawValue::Integer(1))
    .with_value("address", text("555-1000, 555-2000; 555-1000"))
    .with_value("date", RawValue::Integer(5_000))
    .with_value("date_sent", text("not a number"))
    .with_value("type", RawValue::Integer(2));

    let message = normalize_row(&row).expect("group message should normalize");
    assert_eq!(message.peer, "5551000");
    assert_eq!(message.recipients, vec!["5552000".to_string()]);
    assert_eq!(message.direction, Direction::Outbound);
    assert_eq!(message.date_sent_unix_ms, None);
}

#[test]
fn mms_backup_rows_use_seconds_and_message_box() {
    let row = RawRow::new(SourceKind::BackupAgent, Path::new("/dump/1_mms_backup"), 3)
        .with_value("_id", backup_bytes("9"))
        .with_value("address", backup_bytes("555-3000"))
        .with_value("date", backup_bytes("1700000000"))
        .with_value("date_sent", backup_bytes("1699999990"))
        .with_value("msg_box", backup_bytes("2"))
        .with_value("body", backup_bytes("look"))
        .with_value("mms_body", backup_bytes("at this"))
        .with_value(
            "mms_addresses",
            backup_bytes(r#"[{"address":"555-3000"},{"address":"555-4000"}]"#),
        );

    let message = normalize_row(&row).expect("mms row should normalize");
    assert_eq!(message.message_type, MessageType::Mms);
    assert_eq!(message.timestamp_unix_ms, 1_700_000_000_000);
    assert_eq!(message.date_sent_unix_ms, Some(1_699_999_990_000));
    assert_eq!(message.direction, Direction::Outbound);
    assert_eq!(message.body, "look; at this");
    assert_eq!(message.recipients, vec!["5554000".to_string()]);
}

#[test]
fn joined_parts_make_a_row_mms_and_travel_with_it() {
    let mut row = RawRow::new(
        SourceKind::ForensicAgent,
        Path::new("/dump/agent_mmssms.db"),
        1,
    )
    .with_value("_id", RawValue::Integer(2))
    .with_value("address", text("5550000"))
    .with_value("date", RawValue::Integer(20_000))
    .with_value("type", RawValue::Integer(1));
    row.joined_parts.push(RawPart {
        index: 0,
        declared_mime: Some("image/png".to_string()),
        payload: PartPayload::Missing,
    });

    let normalized = normalize_row(&row).expect("mms row should normalize");
    assert_eq!(normalized.message_type, MessageType::Mms);
    assert_eq!(normalized.timestamp_unix_ms, 20_000);
    assert_eq!(normalized.parts.len(), 1);
}

#[test]
fn normalization_is_deterministic() {
    let row = vendor_row(300);
    let first = normalize_row(&row).expect("first pass");
    let second = normalize_row(&row).expect("second pass");
    assert_eq!(first, second);
}

#[test]
fn identity_key_matches_across_sources_for_one_message() {
    let vendor = RawRow::new(SourceKind::VendorLog, Path::new("/dump/logs.db"), 0)
        .with_value("number", text("555-1234"))
        .with_value("date", RawValue::Integer(10_000))
        .with_value("type", RawValue::Integer(1))
        .with_value("m_content", text("h\u{2026}"))
        .with_value("logtype", RawValue::Integer(300));
    let forensic = RawRow::new(
        SourceKind::ForensicAgent,
        Path::new("/dump/agent_mmssms.db"),
        7,
    )
    .with_value("_id", RawValue::Integer(1))
    .with_value("address", text("(555) 1234"))
    .with_value("date", RawValue::Integer(10_400))
    .with_value("body", text("hi"))
    .with_value("type", RawValue::Integer(1));

    let vendor = normalize_row(&vendor).expect("vendor row");
    let forensic = normalize_row(&forensic).expect("forensic row");

    assert_eq!(vendor.identity_key, forensic.identity_key);
    assert_eq!(
        vendor.identity_key,
        identity_key("5551234", 10_000, MessageType::Sms, "hi")
    );
    assert_ne!(
        vendor.identity_key,
        identity_key("5551234", 10_000, MessageType::Sms, "yo")
    );
    assert_ne!(
        vendor.identity_key,
        identity_key("5551234", 10_500, MessageType::Sms, "hi")
    );
}
