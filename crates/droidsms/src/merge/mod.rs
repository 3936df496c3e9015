//! Cross-source deduplication.
//!
//! Records sharing an identity key collapse to one survivor. The survivor is
//! picked by content first (a body, then resolved attachments), then by how
//! much the source is trusted, then by provenance so the choice never depends
//! on input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{CanonicalMessage, SourceKind};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub input_records: usize,
    pub unique_records: usize,
    pub duplicates_discarded: usize,
    /// Discarded records per source kind.
    pub discarded_by_source: BTreeMap<SourceKind, usize>,
}

#[derive(Debug)]
struct MergeBucket {
    survivor: CanonicalMessage,
    discarded: Vec<SourceKind>,
}

impl MergeBucket {
    fn new(message: CanonicalMessage) -> Self {
        Self {
            survivor: message,
            discarded: Vec::new(),
        }
    }

    fn add(&mut self, message: CanonicalMessage) {
        if prefers_candidate(&message, &self.survivor) {
            let replaced = std::mem::replace(&mut self.survivor, message);
            self.discarded.push(replaced.source_kind);
        } else {
            self.discarded.push(message.source_kind);
        }
    }
}

/// Collapses duplicates and orders the result by timestamp, then
/// provenance. Running it on its own output changes nothing.
#[must_use]
pub fn merge_messages(messages: Vec<CanonicalMessage>) -> (Vec<CanonicalMessage>, MergeStats) {
    let input_records = messages.len();
    let mut grouped = BTreeMap::<String, MergeBucket>::new();

    for message in messages {
        if let Some(bucket) = grouped.get_mut(&message.identity_key) {
            bucket.add(message);
        } else {
            grouped.insert(message.identity_key.clone(), MergeBucket::new(message));
        }
    }

    let mut discarded_by_source = BTreeMap::new();
    let mut merged = Vec::with_capacity(grouped.len());
    for bucket in grouped.into_values() {
        for kind in bucket.discarded {
            *discarded_by_source.entry(kind).or_insert(0) += 1;
        }
        merged.push(bucket.survivor);
    }
    merged.sort_by(compare_messages);

    let unique_records = merged.len();
    let stats = MergeStats {
        input_records,
        unique_records,
        duplicates_discarded: input_records.saturating_sub(unique_records),
        discarded_by_source,
    };
    (merged, stats)
}

/// True when `candidate` should replace `current` as the survivor.
#[must_use]
pub fn prefers_candidate(candidate: &CanonicalMessage, current: &CanonicalMessage) -> bool {
    let candidate_has_body = !candidate.body.trim().is_empty();
    let current_has_body = !current.body.trim().is_empty();
    if candidate_has_body != current_has_body {
        return candidate_has_body;
    }

    let candidate_attachments = candidate.resolved_attachment_count();
    let current_attachments = current.resolved_attachment_count();
    if candidate_attachments != current_attachments {
        return candidate_attachments > current_attachments;
    }

    let candidate_trust = candidate.source_kind.trust_rank();
    let current_trust = current.source_kind.trust_rank();
    if candidate_trust != current_trust {
        return candidate_trust > current_trust;
    }

    (&candidate.source_file, candidate.source_row) < (&current.source_file, current.source_row)
}

/// Output order: timestamp, then source file, then row.
#[must_use]
pub fn compare_messages(left: &CanonicalMessage, right: &CanonicalMessage) -> Ordering {
    left.timestamp_unix_ms
        .cmp(&right.timestamp_unix_ms)
        .then_with(|| left.source_file.cmp(&right.source_file))
        .then_with(|| left.source_row.cmp(&right.source_row))
        .then_with(|| left.source_kind.cmp(&right.source_kind))
        .then_with(|| left.identity_key.cmp(&right.identity_key))
}
