// Local systemd journal access, per spec §4.2.
//
// Translates the HTTP range vocabulary (cursor / skip forward+back / limit
// / direction) into the native journal API and hands back `JournalEntry`
// records one pull at a time. Ordering, filtering, cursor placement and
// skipping are all settled before the first record is produced; nothing
// here decides range vs. stream - that's the Streaming HTTP Handler's job
// (`streaming.rs`), which just calls `next()` on a timer and treats `Ok(None)`
// as "nothing right now", interpreting that as EOF or "keep polling"
// depending on which mode it's driving.

use std::collections::BTreeMap;

use crate::error::{GatewayError, Result};
use crate::filters::{FilterSet, Match};
use crate::model::JournalEntry;

// The real `systemd` crate is not available in a development sandbox (no
// libsystemd headers, no running journald), so the same `demo_mode`/`test`
// stand-in the teacher daemon uses for its own hardware access is used
// here for the journal. It behaves like a journal that already contains a
// short, fixed backlog and then idles - enough to exercise seeking,
// skipping, limits and the live-follow poll loop end to end.
#[cfg(any(test, feature = "demo_mode"))]
mod sd {
    use std::collections::BTreeMap;
    use std::io;

    pub(super) type JournalRecord = BTreeMap<String, String>;
    pub(super) type Result<T> = io::Result<T>;

    /// A fixed, in-memory backlog standing in for the real journal.
    fn backlog() -> Vec<JournalRecord> {
        (0..32)
            .map(|i| {
                let mut rec = JournalRecord::new();
                rec.insert("__CURSOR".into(), format!("s={i:x};i=0;b=0;m=0;t=0;x=0"));
                rec.insert(
                    "__REALTIME_TIMESTAMP".into(),
                    format!("{}", 1_700_000_000_000_000u64 + i * 1_000_000),
                );
                rec.insert("__MONOTONIC_TIMESTAMP".into(), format!("{i}"));
                rec.insert("MESSAGE".into(), format!("demo journal entry {i}"));
                rec.insert("UNIT".into(), "demo.service".to_string());
                rec
            })
            .collect()
    }

    pub(super) struct OpenOptions;

    impl OpenOptions {
        pub fn default() -> Self {
            Self
        }
        pub fn system(self, _: bool) -> Self {
            self
        }
        pub fn local_only(self, _: bool) -> Self {
            self
        }
        pub fn open(self) -> Result<Journal> {
            Ok(Journal {
                records: backlog(),
                pos: None,
                and_matches: Vec::new(),
                or_matches: Vec::new(),
            })
        }
    }

    pub(super) struct Journal {
        records: Vec<JournalRecord>,
        // `None` means "before the first entry" (the position right after
        // opening, or after `seek_head`); `Some(i)` means "at entry `i`".
        pos: Option<usize>,
        and_matches: Vec<(String, String)>,
        or_matches: Vec<(String, String)>,
    }

    impl Journal {
        fn matches(&self, rec: &JournalRecord) -> bool {
            let and_ok = self
                .and_matches
                .iter()
                .all(|(f, v)| rec.get(f).map(|val| val == v).unwrap_or(false));

            let or_ok = self.or_matches.is_empty()
                || self
                    .or_matches
                    .iter()
                    .any(|(f, v)| rec.get(f).map(|val| val == v).unwrap_or(false));

            and_ok && or_ok
        }

        pub fn match_add(&mut self, field: &str, value: &str) -> Result<()> {
            self.and_matches
                .push((field.to_string(), value.to_string()));
            Ok(())
        }

        pub fn match_add_or(&mut self, field: &str, value: &str) -> Result<()> {
            self.or_matches.push((field.to_string(), value.to_string()));
            Ok(())
        }

        pub fn seek_head(&mut self) -> Result<()> {
            self.pos = None;
            Ok(())
        }

        pub fn seek_tail(&mut self) -> Result<()> {
            self.pos = Some(self.records.len());
            Ok(())
        }

        pub fn seek_cursor(&mut self, cursor: &str) -> Result<()> {
            let idx = self
                .records
                .iter()
                .position(|r| r.get("__CURSOR").map(String::as_str) == Some(cursor));

            match idx {
                Some(i) => {
                    // Position *before* the matched entry, so that a
                    // subsequent `next_entry()` lands on it - matching the
                    // real journal's `sd_journal_seek_cursor` semantics.
                    self.pos = if i == 0 { None } else { Some(i - 1) };
                    Ok(())
                }
                None => Err(io::Error::other("no such cursor")),
            }
        }

        pub fn cursor(&self) -> Result<String> {
            let i = self.pos.ok_or_else(|| io::Error::other("not positioned"))?;
            self.records
                .get(i)
                .and_then(|r| r.get("__CURSOR").cloned())
                .ok_or_else(|| io::Error::other("position out of range"))
        }

        pub fn next_entry(&mut self) -> Result<Option<JournalRecord>> {
            let mut i = match self.pos {
                None => 0,
                Some(i) => i + 1,
            };

            while i < self.records.len() {
                if self.matches(&self.records[i]) {
                    self.pos = Some(i);
                    return Ok(Some(self.records[i].clone()));
                }
                i += 1;
            }

            self.pos = Some(self.records.len());
            Ok(None)
        }

        pub fn previous_entry(&mut self) -> Result<Option<JournalRecord>> {
            let mut i = match self.pos {
                None => return Ok(None),
                Some(0) => return Ok(None),
                Some(i) => i,
            };

            loop {
                if i == 0 {
                    self.pos = None;
                    return Ok(None);
                }

                i -= 1;

                if self.matches(&self.records[i]) {
                    self.pos = Some(i);
                    return Ok(Some(self.records[i].clone()));
                }
            }
        }
    }
}

#[cfg(not(any(test, feature = "demo_mode")))]
mod sd {
    pub(super) use systemd::journal::{Journal, JournalRecord, OpenOptions};
    pub(super) type Result<T> = systemd::Result<T>;
}

use sd::{Journal, OpenOptions};

/// Builds a `JournalReader`, applying option mutations in the order they
/// were added - each one, per §4.2, "may fail independently".
pub struct JournalReaderBuilder {
    filters: FilterSet,
    cursor: Option<String>,
    limit: Option<u64>,
    skip_next: u64,
    skip_prev: u64,
    reverse: bool,
}

impl Default for JournalReaderBuilder {
    fn default() -> Self {
        Self {
            filters: FilterSet::default(),
            cursor: None,
            limit: None,
            skip_next: 0,
            skip_prev: 0,
            reverse: false,
        }
    }
}

impl JournalReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, matches: Vec<Match>) -> Self {
        self.filters.and.extend(matches);
        self
    }

    pub fn filters_or(mut self, matches: Vec<Match>) -> Self {
        self.filters.or.extend(matches);
        self
    }

    pub fn seek_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// `0` means "no limit", per §8 (boundary behaviors).
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = (n > 0).then_some(n);
        self
    }

    pub fn skip_next(mut self, n: u64) -> Self {
        self.skip_next = n;
        self
    }

    pub fn skip_prev(mut self, n: u64) -> Self {
        self.skip_prev = n;
        self
    }

    pub fn read_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn build(self) -> Result<JournalReader> {
        let mut journal = OpenOptions::default()
            .system(true)
            .local_only(true)
            .open()
            .map_err(|e| GatewayError::Internal(format!("failed to open journal: {e}")))?;

        apply_filters(&mut journal, &self.filters)?;

        if self.cursor.is_none() && self.skip_prev > 0 {
            journal
                .seek_tail()
                .map_err(|e| GatewayError::SeekFailed(e.to_string()))?;
        }

        if let Some(cursor) = &self.cursor {
            journal
                .seek_cursor(cursor)
                .map_err(|e| GatewayError::SeekFailed(e.to_string()))?;

            let landed = journal
                .next_entry()
                .map_err(|e| GatewayError::JournalIo(e.to_string()))?;

            match landed {
                Some(_) => {
                    let at = journal
                        .cursor()
                        .map_err(|e| GatewayError::JournalIo(e.to_string()))?;
                    if &at != cursor {
                        return Err(GatewayError::InvalidCursor);
                    }
                }
                None => return Err(GatewayError::InvalidCursor),
            }

            // The verification above already consumed the entry at `cursor`;
            // re-seek so the reader's first real pull (§8, invariant 4)
            // lands on that same entry again instead of the one after it.
            journal
                .seek_cursor(cursor)
                .map_err(|e| GatewayError::SeekFailed(e.to_string()))?;
        }

        let mut actual_skipped_next = 0;
        for _ in 0..self.skip_next {
            match journal
                .next_entry()
                .map_err(|e| GatewayError::JournalIo(e.to_string()))?
            {
                Some(_) => actual_skipped_next += 1,
                None => break,
            }
        }

        let mut actual_skipped_prev = 0;
        for _ in 0..self.skip_prev {
            match journal
                .previous_entry()
                .map_err(|e| GatewayError::JournalIo(e.to_string()))?
            {
                Some(_) => actual_skipped_prev += 1,
                None => break,
            }
        }

        Ok(JournalReader {
            journal,
            limit: self.limit,
            limit_used: 0,
            reverse: self.reverse,
            actual_skipped_next,
            actual_skipped_prev,
        })
    }
}

fn apply_filters(journal: &mut Journal, filters: &FilterSet) -> Result<()> {
    for m in &filters.and {
        journal
            .match_add(&m.field, &m.value)
            .map_err(|e| GatewayError::Internal(format!("failed to add journal filter: {e}")))?;
    }

    for m in &filters.or {
        journal
            .match_add_or(&m.field, &m.value)
            .map_err(|e| GatewayError::Internal(format!("failed to add journal filter: {e}")))?;
    }

    Ok(())
}

pub struct JournalReader {
    journal: Journal,
    limit: Option<u64>,
    limit_used: u64,
    reverse: bool,
    actual_skipped_next: u64,
    actual_skipped_prev: u64,
}

impl JournalReader {
    /// Value for the `X-Journal-Skip-Next` response header.
    pub fn actual_skipped_next(&self) -> u64 {
        self.actual_skipped_next
    }

    /// Value for the `X-Journal-Skip-Prev` response header.
    pub fn actual_skipped_prev(&self) -> u64 {
        self.actual_skipped_prev
    }

    /// Pull the next record in whichever direction this reader was built
    /// to read. `Ok(None)` means "nothing available right now" - the
    /// Streaming HTTP Handler decides whether that's end-of-stream (range
    /// mode) or "come back later" (stream mode); this reader doesn't know
    /// which mode it's being driven in.
    pub fn next(&mut self) -> Result<Option<JournalEntry>> {
        if let Some(limit) = self.limit {
            if self.limit_used >= limit {
                return Ok(None);
            }
        }

        let record = if self.reverse {
            self.journal.previous_entry()
        } else {
            self.journal.next_entry()
        }
        .map_err(|e| GatewayError::JournalIo(e.to_string()))?;

        let record = match record {
            Some(r) => r,
            None => return Ok(None),
        };

        self.limit_used += 1;

        Ok(Some(to_entry(record)))
    }
}

fn to_entry(record: BTreeMap<String, String>) -> JournalEntry {
    let cursor = record.get("__CURSOR").cloned().unwrap_or_default();

    let realtime_ts = record
        .get("__REALTIME_TIMESTAMP")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let monotonic_ts = record
        .get("__MONOTONIC_TIMESTAMP")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    JournalEntry {
        fields: record,
        cursor,
        monotonic_ts,
        realtime_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_caps_records_emitted() {
        let mut reader = JournalReaderBuilder::new().limit(3).build().unwrap();

        let mut count = 0;
        while reader.next().unwrap().is_some() {
            count += 1;
        }

        assert_eq!(count, 3);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let mut reader = JournalReaderBuilder::new().limit(0).build().unwrap();

        let mut count = 0;
        while reader.next().unwrap().is_some() {
            count += 1;
        }

        assert_eq!(count, 32);
    }

    #[test]
    fn skip_prev_without_cursor_seeks_tail_first() {
        let mut reader = JournalReaderBuilder::new().skip_prev(5).build().unwrap();

        assert_eq!(reader.actual_skipped_prev(), 5);

        let first = reader.next().unwrap();
        assert!(
            first.is_none(),
            "no cursor was set so forward reads start at tail"
        );
    }

    #[test]
    fn skip_larger_than_backlog_reports_actual_count() {
        let reader = JournalReaderBuilder::new().skip_next(1000).build().unwrap();
        assert_eq!(reader.actual_skipped_next(), 32);
    }

    #[test]
    fn valid_cursor_is_returned_first() {
        let mut probe = JournalReaderBuilder::new().limit(5).build().unwrap();
        let entries: Vec<_> = std::iter::from_fn(|| probe.next().unwrap()).collect();
        let target_cursor = entries[2].cursor.clone();

        let mut reader = JournalReaderBuilder::new()
            .seek_cursor(target_cursor.clone())
            .build()
            .unwrap();

        let first = reader.next().unwrap().unwrap();
        // Per §8 invariant 4, the entry at the cursor itself is the first
        // one emitted, not the one after it.
        assert_eq!(first.cursor, target_cursor);
    }

    #[test]
    fn invalid_cursor_is_rejected() {
        let err = JournalReaderBuilder::new()
            .seek_cursor("s=ffffffff;i=0;b=0;m=0;t=0;x=0")
            .build()
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidCursor));
    }

    #[test]
    fn or_filter_matches_either_field() {
        let mut reader = JournalReaderBuilder::new()
            .filters_or(vec![
                Match::new("UNIT", "demo.service"),
                Match::new("_SYSTEMD_UNIT", "demo.service"),
            ])
            .limit(1)
            .build()
            .unwrap();

        assert!(reader.next().unwrap().is_some());
    }

    #[test]
    fn and_filter_on_nonexistent_value_yields_nothing() {
        let mut reader = JournalReaderBuilder::new()
            .filters(vec![Match::new("UNIT", "does-not-exist.service")])
            .build()
            .unwrap();

        assert!(reader.next().unwrap().is_none());
    }
}
