//! Classifies every scan batch against the batch stored just before it.
//!
//! Batches are ordered by scan id, most recent first. The predecessor of a
//! batch is the next one in that order, so gaps in ids are irrelevant. Rows
//! are keyed by `(domain, subdomain)`. Only http codes, ports and IP take
//! part in the comparison; screenshots never make a row `Modified`.

use crate::model::{scan_time_format, ScanId, ScanRecord, StoredRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use time::PrimitiveDateTime;

// region:        --- Types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl RowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowKind::Added => "added",
            RowKind::Modified => "modified",
            RowKind::Removed => "removed",
            RowKind::Unchanged => "unchanged",
        }
    }
}

/// A field value, with the previous one when it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change<T> {
    Same(T),
    Changed { old: T, new: T },
}

impl<T: PartialEq> Change<T> {
    fn between(old: T, new: T) -> Self {
        if old == new {
            Change::Same(new)
        } else {
            Change::Changed { old, new }
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Change::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRow {
    pub kind: RowKind,
    pub domain: String,
    pub subdomain: String,
    pub http_codes: Change<Vec<u16>>,
    pub ports: Change<Vec<u16>>,
    pub ip_address: Change<Option<Ipv4Addr>>,
    #[serde(serialize_with = "scan_time_format::option::serialize")]
    pub scan_time: Option<PrimitiveDateTime>,
    #[serde(skip)]
    pub image_http: Option<Vec<u8>>,
    #[serde(skip)]
    pub image_https: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    /// Records in the current batch, removed rows excluded.
    pub total: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanDiff {
    pub scan_id: ScanId,
    pub previous_scan_id: Option<ScanId>,
    #[serde(serialize_with = "scan_time_format::option::serialize")]
    pub scan_time: Option<PrimitiveDateTime>,
    pub counts: DiffCounts,
    pub rows: Vec<DiffRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub scans: usize,
    pub subdomains: usize,
    pub domains: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryReport {
    pub totals: Totals,
    pub scans: Vec<ScanDiff>,
}

// endregion:     --- Types

/// Stored records grouped by scan id.
#[derive(Debug, Clone, Default)]
pub struct ScanHistory {
    batches: BTreeMap<ScanId, Vec<ScanRecord>>,
}

impl ScanHistory {
    /// Keeps the incoming order inside each batch.
    pub fn from_records(records: impl IntoIterator<Item = StoredRecord>) -> Self {
        let mut batches: BTreeMap<ScanId, Vec<ScanRecord>> = BTreeMap::new();
        for stored in records {
            batches.entry(stored.scan_id).or_default().push(stored.record);
        }
        Self { batches }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn totals(&self) -> Totals {
        let records = || self.batches.values().flatten();
        Totals {
            scans: self.batches.len(),
            subdomains: records()
                .map(|record| record.subdomain.as_str())
                .collect::<HashSet<&str>>()
                .len(),
            domains: records()
                .map(|record| record.domain.as_str())
                .collect::<HashSet<&str>>()
                .len(),
        }
    }

    pub fn diff(&self) -> HistoryReport {
        let sorted: Vec<(&ScanId, &Vec<ScanRecord>)> = self.batches.iter().rev().collect();

        let scans = sorted
            .iter()
            .enumerate()
            .map(|(i, (scan_id, current))| {
                let previous = sorted.get(i + 1);
                diff_batch(
                    **scan_id,
                    current,
                    previous.map(|(id, _)| **id),
                    previous.map(|(_, records)| records.as_slice()).unwrap_or(&[]),
                )
            })
            .collect();

        HistoryReport {
            totals: self.totals(),
            scans,
        }
    }
}

fn diff_batch(
    scan_id: ScanId,
    current: &[ScanRecord],
    previous_scan_id: Option<ScanId>,
    previous: &[ScanRecord],
) -> ScanDiff {
    let lookup: HashMap<(&str, &str), &ScanRecord> = previous
        .iter()
        .map(|record| ((record.domain.as_str(), record.subdomain.as_str()), record))
        .collect();

    let mut counts = DiffCounts {
        total: current.len(),
        ..DiffCounts::default()
    };
    let mut rows = Vec::with_capacity(current.len());
    let mut current_keys = HashSet::new();

    for record in current {
        let key = (record.domain.as_str(), record.subdomain.as_str());
        current_keys.insert(key);

        let row = match lookup.get(&key) {
            None => {
                counts.added += 1;
                DiffRow::from_record(RowKind::Added, record)
            }
            Some(old) => {
                let row = DiffRow::compared(old, record);
                match row.kind {
                    RowKind::Modified => counts.modified += 1,
                    _ => counts.unchanged += 1,
                }
                row
            }
        };
        rows.push(row);
    }

    let mut emitted = HashSet::new();
    for record in previous {
        let key = (record.domain.as_str(), record.subdomain.as_str());
        if current_keys.contains(&key) || !emitted.insert(key) {
            continue;
        }
        counts.removed += 1;
        rows.push(DiffRow::removed(lookup[&key]));
    }

    ScanDiff {
        scan_id,
        previous_scan_id,
        scan_time: current.iter().map(|record| record.scan_time).max(),
        counts,
        rows,
    }
}

impl DiffRow {
    fn from_record(kind: RowKind, record: &ScanRecord) -> Self {
        Self {
            kind,
            domain: record.domain.clone(),
            subdomain: record.subdomain.clone(),
            http_codes: Change::Same(record.http_codes()),
            ports: Change::Same(record.ports()),
            ip_address: Change::Same(record.ip_address),
            scan_time: Some(record.scan_time),
            image_http: record.image_http.clone(),
            image_https: record.image_https.clone(),
        }
    }

    fn compared(old: &ScanRecord, new: &ScanRecord) -> Self {
        let http_codes = Change::between(old.http_codes(), new.http_codes());
        let ports = Change::between(old.ports(), new.ports());
        let ip_address = Change::between(old.ip_address, new.ip_address);

        let kind = if http_codes.is_changed() || ports.is_changed() || ip_address.is_changed() {
            RowKind::Modified
        } else {
            RowKind::Unchanged
        };

        Self {
            kind,
            domain: new.domain.clone(),
            subdomain: new.subdomain.clone(),
            http_codes,
            ports,
            ip_address,
            scan_time: Some(new.scan_time),
            image_http: new.image_http.clone(),
            image_https: new.image_https.clone(),
        }
    }

    /// Row for a key of the previous batch that vanished.
    fn removed(old: &ScanRecord) -> Self {
        Self {
            scan_time: None,
            image_http: None,
            image_https: None,
            ..Self::from_record(RowKind::Removed, old)
        }
    }
}
