pub mod message;
pub mod raw;

pub use message::{
    Attachment, CanonicalMessage, Direction, MessageType, SCHEMA_VERSION, SourceKind,
    all_source_kinds, json_schema,
};
pub use raw::{PartPayload, RawEntity, RawPart, RawRow, RawValue};
