//! Per-shank log of alignment attempts.
//!
//! Each shank owns one JSON file mapping an ISO-8601 timestamp (seconds precision, no
//! offset) to the `[feature, track]` pair of that attempt. Entries are only ever added.
//! The display list always ends with the synthetic [`ORIGINAL`] entry, which means "no
//! alignment applied" and is never written to disk.
//!
//! Timestamps are local time. The local UTC offset can only be read safely while the
//! process has a single thread, so binaries call [`capture_local_offset`] at startup.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::error::{ConsistencyFault, HistoryError};

/// Display key for the unaligned state
pub const ORIGINAL: &str = "original";

/// A single alignment attempt: feature positions and the track positions they map to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord(pub Vec<f64>, pub Vec<f64>);

impl AlignmentRecord {
    pub fn new(feature: Vec<f64>, track: Vec<f64>) -> Result<Self, ConsistencyFault> {
        if feature.len() != track.len() {
            return Err(ConsistencyFault::AlignmentLength(feature.len(), track.len()));
        }
        Ok(Self(feature, track))
    }

    pub fn feature(&self) -> &[f64] {
        &self.0
    }

    pub fn track(&self) -> &[f64] {
        &self.1
    }
}

/// Timestamp-keyed alignment history of one shank
pub type AlignmentHistory = BTreeMap<String, AlignmentRecord>;

/// History file name for a shank. Single-shank probes use the unsuffixed name.
pub fn history_file_name(shank: usize, n_shanks: usize) -> String {
    if n_shanks == 1 {
        String::from("prev_alignments.json")
    } else {
        format!("prev_alignments_shank{}.json", shank + 1)
    }
}

pub fn history_path(dir: &Path, shank: usize, n_shanks: usize) -> PathBuf {
    dir.join(history_file_name(shank, n_shanks))
}

/// Keys in display order: newest first, then [`ORIGINAL`]
pub fn display_list(history: &AlignmentHistory) -> Vec<String> {
    let mut keys: Vec<String> = history.keys().rev().cloned().collect();
    keys.push(String::from(ORIGINAL));
    keys
}

/// Read the history of a shank from `dir`. A missing file is an empty history.
pub fn load_history(
    dir: &Path,
    shank: usize,
    n_shanks: usize,
) -> Result<(AlignmentHistory, Vec<String>), HistoryError> {
    let path = history_path(dir, shank, n_shanks);
    if !path.exists() {
        spdlog::info!("No previous alignments found at {}", path.display());
        return Ok((AlignmentHistory::new(), vec![String::from(ORIGINAL)]));
    }

    let history: AlignmentHistory = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    for record in history.values() {
        if record.0.len() != record.1.len() {
            return Err(ConsistencyFault::AlignmentLength(record.0.len(), record.1.len()).into());
        }
    }
    spdlog::info!(
        "Loaded {} previous alignment(s) from {}",
        history.len(),
        path.display()
    );
    let display = display_list(&history);
    Ok((history, display))
}

/// Look up a display key. [`ORIGINAL`] resolves to `None`.
///
/// # Panics
/// If `key` is neither [`ORIGINAL`] nor present in `history`. Keys must come from the
/// display list returned alongside the history.
pub fn resolve_entry<'a>(history: &'a AlignmentHistory, key: &str) -> Option<&'a AlignmentRecord> {
    if key == ORIGINAL {
        return None;
    }
    match history.get(key) {
        Some(record) => Some(record),
        None => panic!("Alignment {key} was never listed in the alignment history"),
    }
}

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Read the local UTC offset and keep it for every later timestamp.
///
/// Must run before the process spawns threads; afterwards the offset is indeterminate.
pub fn capture_local_offset() -> Result<UtcOffset, time::error::IndeterminateOffset> {
    Ok(set_local_offset(UtcOffset::current_local_offset()?))
}

/// Use `offset` as the local offset from now on. The first offset set is kept and returned.
pub fn set_local_offset(offset: UtcOffset) -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| offset)
}

fn local_offset() -> UtcOffset {
    if let Some(offset) = LOCAL_OFFSET.get() {
        return *offset;
    }
    match UtcOffset::current_local_offset() {
        Ok(offset) => set_local_offset(offset),
        Err(_) => {
            spdlog::warn!("Local UTC offset was never captured, timestamping alignment in UTC");
            UtcOffset::UTC
        }
    }
}

/// `now` at `offset`, truncated to whole seconds and formatted `YYYY-MM-DDTHH:MM:SS`
pub fn timestamp_in(now: OffsetDateTime, offset: UtcOffset) -> Result<String, HistoryError> {
    let local = now.to_offset(offset);
    let truncated = local.replace_nanosecond(0).unwrap_or(local);
    format_timestamp(PrimitiveDateTime::new(truncated.date(), truncated.time()))
}

/// Current local time, see [`timestamp_in`]
pub fn now_timestamp() -> Result<String, HistoryError> {
    timestamp_in(OffsetDateTime::now_utc(), local_offset())
}

pub fn format_timestamp(datetime: PrimitiveDateTime) -> Result<String, HistoryError> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    Ok(datetime.format(&format)?)
}

/// Pretty-printed JSON text of a history
pub fn history_to_json(history: &AlignmentHistory) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(history)
}

/// Merge a record into the history under `timestamp`.
///
/// A record already stored under the same second is replaced.
pub fn insert_record(history: &mut AlignmentHistory, timestamp: String, record: AlignmentRecord) {
    if history.insert(timestamp.clone(), record).is_some() {
        spdlog::warn!("Alignment {timestamp} already existed and was overwritten");
    }
}

/// Merge a new alignment under an explicit timestamp and rewrite the history file in `dir`
pub fn commit_at(
    history: &mut AlignmentHistory,
    record: AlignmentRecord,
    timestamp: String,
    dir: &Path,
    shank: usize,
    n_shanks: usize,
) -> Result<PathBuf, HistoryError> {
    insert_record(history, timestamp, record);
    let path = history_path(dir, shank, n_shanks);
    std::fs::write(&path, history_to_json(history)?)?;
    spdlog::info!("Wrote {} alignment(s) to {}", history.len(), path.display());
    Ok(path)
}

/// Merge a new alignment stamped with the current time and rewrite the history file
pub fn commit(
    history: &mut AlignmentHistory,
    feature: Vec<f64>,
    track: Vec<f64>,
    dir: &Path,
    shank: usize,
    n_shanks: usize,
) -> Result<PathBuf, HistoryError> {
    let record = AlignmentRecord::new(feature, track)?;
    commit_at(history, record, now_timestamp()?, dir, shank, n_shanks)
}
