use std::io::Write;
use std::path::Path;

use droidsms::RecoveryError;
use droidsms::adapters::backup_agent::{
    BackupAgentFile, BackupEncoding, BackupRowDecoder, END_OF_ROW_KEY, encode_entities,
    encode_footer, is_header_key,
};
use droidsms::merge::merge_messages;
use droidsms::models::{Direction, MessageType, RawValue};
use droidsms::normalize::normalize_row;
use flate2::Compression;
use flate2::write::ZlibEncoder;

const SMS_BACKUP: &str = "/dump/com.android.providers.telephony/1_sms_backup";

fn bytes(value: &str) -> Option<&[u8]> {
    Some(value.as_bytes())
}

fn scenario_container() -> Vec<u8> {
    let mut container = encode_entities([
        ("id", bytes("1")),
        ("type", bytes("1")),
        ("address", bytes("555-1234")),
        ("date", bytes("1000")),
        ("body", bytes("hi")),
        ("id", bytes("2")),
        ("type", bytes("2")),
        ("address", bytes("(555) 1234")),
        ("date", bytes("2000")),
        ("body", bytes("yo")),
    ]);
    container.extend(encode_footer());
    container
}

#[test]
fn decodes_one_row_per_header_key() {
    let container = scenario_container();
    let mut decoder = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP));
    let rows = decoder.by_ref().collect::<Vec<_>>();

    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("body"),
        Some(&RawValue::Bytes(b"hi".to_vec()))
    );
    assert_eq!(
        rows[1].get("address"),
        Some(&RawValue::Bytes(b"(555) 1234".to_vec()))
    );
    assert_eq!(rows[0].row_index, 0);
    assert_eq!(rows[1].row_index, 1);
    assert_eq!(decoder.stats().entities, 10);
    assert_eq!(decoder.stats().corrupt_rows, 0);
}

#[test]
fn scenario_rows_normalize_to_same_peer_in_time_order() {
    let container = scenario_container();
    let messages = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP))
        .map(|row| {
            normalize_row(&row)
                .expect("scenario row should normalize")
                .into_message(Vec::new())
        })
        .collect::<Vec<_>>();
    let (merged, stats) = merge_messages(messages);

    assert_eq!(stats.duplicates_discarded, 0);
    assert_eq!(merged.len(), 2);
    assert!(merged.iter().all(|message| message.peer == "5551234"));
    assert_eq!(merged[0].direction, Direction::Inbound);
    assert_eq!(merged[1].direction, Direction::Outbound);
    assert_eq!(merged[0].timestamp_unix_ms, 1_000);
    assert_eq!(merged[1].timestamp_unix_ms, 2_000);
    assert!(
        merged
            .iter()
            .all(|message| message.message_type == MessageType::Sms)
    );
}

#[test]
fn deleted_keys_never_reach_the_row() {
    let container = encode_entities([
        ("_id", bytes("1")),
        ("body", bytes("draft")),
        ("address", bytes("555")),
        ("body", None),
        ("_id", bytes("2")),
        ("subject", None),
        ("body", bytes("kept")),
    ]);
    let mut decoder = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP));
    let rows = decoder.by_ref().collect::<Vec<_>>();

    assert_eq!(rows.len(), 2);
    assert!(rows[0].get("body").is_none());
    assert!(!rows[0].values.contains_key("body"));
    assert!(!rows[1].values.contains_key("subject"));
    assert_eq!(rows[1].get("body"), Some(&RawValue::Bytes(b"kept".to_vec())));
    assert_eq!(decoder.stats().deleted_keys, 2);
}

#[test]
fn corrupt_length_drops_only_the_affected_row() {
    let mut container = encode_entities([("_id", bytes("1")), ("body", bytes("first"))]);
    let corrupt_row_start = container.len();
    container.extend(encode_entities([
        ("_id", bytes("2")),
        ("body", bytes("broken")),
    ]));
    // Second entity of the middle row starts 20 bytes in; its data size
    // field sits 8 bytes into the entity.
    let size_field = corrupt_row_start + 20 + 8;
    container[size_field..size_field + 4].copy_from_slice(&0x7fff_0000_i32.to_le_bytes());
    container.extend(encode_entities([("_id", bytes("3")), ("body", bytes("third"))]));
    container.extend(encode_footer());

    let mut decoder = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP));
    let rows = decoder.by_ref().collect::<Vec<_>>();

    let bodies = rows
        .iter()
        .map(|row| row.get("body").cloned())
        .collect::<Vec<_>>();
    assert_eq!(
        bodies,
        vec![
            Some(RawValue::Bytes(b"first".to_vec())),
            Some(RawValue::Bytes(b"third".to_vec())),
        ]
    );
    assert_eq!(decoder.stats().corrupt_rows, 1);
    assert!(matches!(
        decoder.corruptions(),
        [RecoveryError::CorruptRow { .. }]
    ));
}

#[test]
fn row_count_matches_header_recurrences() {
    let layouts: [&[&str]; 5] = [
        &["_id", "address", "date", "body"],
        &["id", "body"],
        &["row_id", "read"],
        &["_id", "type", "date", "address", "body", "read", "seen"],
        &["_id", "date", END_OF_ROW_KEY],
    ];

    let mut entities = Vec::new();
    for repeat in 0..3 {
        for layout in layouts {
            for key in layout {
                entities.push((*key, bytes(if repeat % 2 == 0 { "1" } else { "22" })));
            }
        }
    }
    let expected = entities.iter().filter(|(key, _)| is_header_key(key)).count();

    let container = encode_entities(entities);
    let rows = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP)).count();
    assert_eq!(rows, expected);
}

#[test]
fn a_row_may_carry_several_header_keys() {
    let container = encode_entities([
        ("_id", bytes("1")),
        ("row_id", bytes("77")),
        ("type", bytes("1")),
        ("address", bytes("555-1234")),
        ("date", bytes("1000")),
        ("body", bytes("hi")),
        ("_id", bytes("2")),
        ("_id", bytes("3")),
        ("date", bytes("3000")),
    ]);
    let rows = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP)).collect::<Vec<_>>();

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0].values.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["_id", "address", "body", "date", "row_id", "type"]
    );
    assert_eq!(rows[1].values.len(), 1);
    assert_eq!(rows[2].get("_id"), Some(&RawValue::Bytes(b"3".to_vec())));

    let message = normalize_row(&rows[0]).expect("combined header row should normalize");
    assert_eq!(message.body, "hi");
    assert_eq!(message.timestamp_unix_ms, 1_000);
}

#[test]
fn damaged_leading_magic_keeps_the_following_rows() {
    let mut container = encode_entities([
        ("_id", bytes("1")),
        ("date", bytes("1000")),
        ("body", bytes("lost")),
        ("_id", bytes("2")),
        ("address", bytes("555-1234")),
        ("date", bytes("2000")),
        ("body", bytes("kept")),
    ]);
    container.extend(encode_footer());
    container[0] = b'X';

    let file = BackupAgentFile::from_bytes(Path::new(SMS_BACKUP), container)
        .expect("a damaged first entity must not reject the file");
    assert_eq!(file.encoding(), BackupEncoding::EntityStream);

    let mut decoder = file.entity_rows();
    let rows = decoder.by_ref().collect::<Vec<_>>();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("body"), Some(&RawValue::Bytes(b"kept".to_vec())));
    assert_eq!(decoder.stats().corrupt_rows, 1);
    assert!(matches!(
        decoder.corruptions(),
        [RecoveryError::CorruptRow { offset: 0, .. }]
    ));
}

#[test]
fn end_of_row_marker_closes_the_row_early() {
    let container = encode_entities([
        ("_id", bytes("1")),
        ("body", bytes("a")),
        (END_OF_ROW_KEY, bytes("")),
        ("body", bytes("stray")),
        ("_id", bytes("2")),
    ]);
    let mut decoder = BackupRowDecoder::new(&container, Path::new(SMS_BACKUP));
    let rows = decoder.by_ref().collect::<Vec<_>>();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("body"), Some(&RawValue::Bytes(b"a".to_vec())));
    assert!(rows[1].get("body").is_none());
    assert_eq!(decoder.stats().orphan_entities, 1);
}

#[test]
fn decoding_is_restartable() {
    let file = BackupAgentFile::from_bytes(Path::new(SMS_BACKUP), scenario_container())
        .expect("entity container should open");
    assert_eq!(file.encoding(), BackupEncoding::EntityStream);

    let first = file.entity_rows().collect::<Vec<_>>();
    let second = file.entity_rows().collect::<Vec<_>>();
    assert_eq!(first, second);
}

#[test]
fn compressed_json_backups_yield_rows() {
    let document = r#"[
        {"_id": 1, "address": "555-1234", "date": 1000, "type": 1, "body": "hi"},
        7,
        {"_id": 2, "address": "555-1234", "date": "2000", "type": "2", "body": "yo", "recipients": ["555-0001"]}
    ]"#;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(document.as_bytes())
        .expect("fixture should compress");
    let compressed = encoder.finish().expect("fixture should finish");

    let file = BackupAgentFile::from_bytes(Path::new(SMS_BACKUP), compressed)
        .expect("compressed container should open");
    assert_eq!(file.encoding(), BackupEncoding::CompressedJson);

    let parsed = file.json_rows().expect("json rows should parse");
    assert_eq!(parsed.skipped, vec![1]);
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[0].get("date"), Some(&RawValue::Integer(1000)));
    assert_eq!(
        parsed.rows[1].get("recipients"),
        Some(&RawValue::Text(r#"["555-0001"]"#.to_string()))
    );

    let normalized = normalize_row(&parsed.rows[1]).expect("json row should normalize");
    assert_eq!(normalized.timestamp_unix_ms, 2_000);
    assert_eq!(normalized.direction, Direction::Outbound);
    assert_eq!(normalized.recipients, vec!["5550001".to_string()]);
}

#[test]
fn foreign_content_is_source_unreadable() {
    let error = BackupAgentFile::from_bytes(
        Path::new(SMS_BACKUP),
        b"this is a text file, not a backup".to_vec(),
    )
    .expect_err("text content must be rejected");

    assert!(matches!(
        error.downcast_ref::<RecoveryError>(),
        Some(RecoveryError::SourceUnreadable { .. })
    ));
}

#[test]
fn empty_container_has_no_rows() {
    let file = BackupAgentFile::from_bytes(Path::new(SMS_BACKUP), Vec::new())
        .expect("empty container should open");
    assert_eq!(file.entity_rows().count(), 0);
}
