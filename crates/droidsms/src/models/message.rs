use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION: &str = "droidsms.message.v1";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    BackupAgent,
    VendorLog,
    ForensicAgent,
}

impl SourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackupAgent => "backup_agent",
            Self::VendorLog => "vendor_log",
            Self::ForensicAgent => "forensic_agent",
        }
    }

    /// Higher is more trusted when duplicates disagree.
    #[must_use]
    pub const fn trust_rank(self) -> u8 {
        match self {
            Self::ForensicAgent => 3,
            Self::BackupAgent => 2,
            Self::VendorLog => 1,
        }
    }
}

#[must_use]
pub const fn all_source_kinds() -> [SourceKind; 3] {
    [
        SourceKind::BackupAgent,
        SourceKind::VendorLog,
        SourceKind::ForensicAgent,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
    Unknown,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Sms,
    Mms,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Mms => "MMS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    pub mime_type: String,
    /// Path relative to the output directory; `None` marks a part that could
    /// not be extracted.
    pub relative_path: Option<String>,
}

impl Attachment {
    pub const PLACEHOLDER_MIME: &'static str = "unknown";
    pub const PLACEHOLDER_MARKER: &'static str = "<unavailable>";

    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            mime_type: Self::PLACEHOLDER_MIME.to_string(),
            relative_path: None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.relative_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CanonicalMessage {
    pub direction: Direction,
    pub peer: String,
    pub timestamp_unix_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_sent_unix_ms: Option<u64>,

    pub body: String,
    pub message_type: MessageType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,

    pub source_kind: SourceKind,
    pub source_file: String,
    pub source_row: u64,
    pub identity_key: String,
}

impl CanonicalMessage {
    #[must_use]
    pub fn resolved_attachment_count(&self) -> usize {
        self.attachments
            .iter()
            .filter(|attachment| attachment.is_resolved())
            .count()
    }
}

#[must_use]
pub fn json_schema() -> Value {
    let schema = schemars::schema_for!(CanonicalMessage);
    match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => {
            panic!("failed to serialize generated message schema: {error}");
        }
    }
}
