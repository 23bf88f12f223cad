//! Date-bucketed message cache.
//!
//! The cache owns the rows of one conversation grouped into calendar-day
//! buckets. `dates` holds the bucket keys in ascending order and each bucket
//! holds its rows in ascending `(created_at, sequence_order)` order.
//! `loaded_ids` always equals the union of the ids across all buckets.
//!
//! The cache has no locking of its own; the store serializes access to it.

use crate::date_key::DateKey;
use crate::pagination::Direction;
use crate::style::{compute_style, StyleContext, StyleFlags};
use chat_types::{MessageId, MessageRecord};
use chrono::FixedOffset;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A record together with its derived style flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageViewModel {
    /// The record.
    pub record: MessageRecord,
    /// Derived grouping flags.
    pub style: StyleFlags,
}

impl MessageViewModel {
    fn unstyled(record: MessageRecord) -> Self {
        Self {
            record,
            style: StyleFlags::default(),
        }
    }
}

/// Section/row address of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowIndex {
    /// Bucket index in `dates` order.
    pub section: usize,
    /// Row index inside the bucket.
    pub row: usize,
}

impl RowIndex {
    /// Address `row` of `section`.
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

/// Result of merging a pagination page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Buckets created by the merge.
    pub sections_added: usize,
    /// Rows added across all buckets.
    pub rows_added: usize,
    /// Records skipped because their id was already loaded.
    pub duplicates_dropped: usize,
}

/// Result of a single-record insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Where the record landed.
    pub index: RowIndex,
    /// Whether a bucket was created for it.
    pub new_section: bool,
}

/// Result of removing a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoveOutcome {
    /// A row was removed.
    pub row_removed: bool,
    /// The bucket became empty and was removed with its date key.
    pub section_removed: bool,
}

fn order_key(record: &MessageRecord) -> (chrono::DateTime<chrono::Utc>, i64) {
    (record.created_at, record.sequence_order)
}

/// Recompute style for `rows[from..to]` using each row's bucket neighbours.
fn restyle(rows: &mut [MessageViewModel], from: usize, to: usize, ctx: &StyleContext) {
    let to = to.min(rows.len());
    for i in from..to {
        let style = {
            let prev = i.checked_sub(1).map(|p| &rows[p].record);
            let next = rows.get(i + 1).map(|vm| &vm.record);
            compute_style(&rows[i].record, prev, next, ctx)
        };
        rows[i].style = style;
    }
}

/// In-memory, date-bucketed rows of one conversation.
#[derive(Debug, Clone)]
pub struct MessageCache {
    dates: Vec<DateKey>,
    buckets: HashMap<DateKey, Vec<MessageViewModel>>,
    loaded_ids: HashSet<MessageId>,
    offset: FixedOffset,
    ctx: StyleContext,
}

impl MessageCache {
    /// Empty cache keyed by local days at `offset`.
    pub fn new(offset: FixedOffset, ctx: StyleContext) -> Self {
        Self {
            dates: Vec::new(),
            buckets: HashMap::new(),
            loaded_ids: HashSet::new(),
            offset,
            ctx,
        }
    }

    /// Style context used for every recompute.
    pub fn context(&self) -> &StyleContext {
        &self.ctx
    }

    /// Replace the style context. Existing flags are left as they are.
    pub fn set_context(&mut self, ctx: StyleContext) {
        self.ctx = ctx;
    }

    fn key_of(&self, record: &MessageRecord) -> DateKey {
        DateKey::from_timestamp(record.created_at, self.offset)
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// Number of buckets.
    pub fn section_count(&self) -> usize {
        self.dates.len()
    }

    /// Rows in `section`, zero when out of range.
    pub fn row_count(&self, section: usize) -> usize {
        self.section(section).map_or(0, <[_]>::len)
    }

    /// Total rows across all buckets.
    pub fn len(&self) -> usize {
        self.loaded_ids.len()
    }

    /// No rows loaded.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Date key of `section`.
    pub fn section_key(&self, section: usize) -> Option<DateKey> {
        self.dates.get(section).copied()
    }

    /// All rows of `section`.
    pub fn section(&self, section: usize) -> Option<&[MessageViewModel]> {
        let key = self.dates.get(section)?;
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// View model at an address.
    pub fn view_model_at(&self, section: usize, row: usize) -> Option<&MessageViewModel> {
        self.section(section)?.get(row)
    }

    /// Record at an address.
    pub fn record_at(&self, section: usize, row: usize) -> Option<&MessageRecord> {
        self.view_model_at(section, row).map(|vm| &vm.record)
    }

    /// Whether `id` is loaded.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.loaded_ids.contains(id)
    }

    /// The set of loaded ids.
    pub fn loaded_ids(&self) -> &HashSet<MessageId> {
        &self.loaded_ids
    }

    /// Iterate view models in display order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageViewModel> + '_ {
        self.dates
            .iter()
            .filter_map(|key| self.buckets.get(key))
            .flat_map(|rows| rows.iter())
    }

    /// First row, scanning sections and rows ascending, matching `predicate`.
    pub fn locate<F>(&self, mut predicate: F) -> Option<RowIndex>
    where
        F: FnMut(&MessageRecord) -> bool,
    {
        for (section, key) in self.dates.iter().enumerate() {
            let Some(rows) = self.buckets.get(key) else {
                continue;
            };
            if let Some(row) = rows.iter().position(|vm| predicate(&vm.record)) {
                return Some(RowIndex::new(section, row));
            }
        }
        None
    }

    /// Address of the row with `id`.
    pub fn position_of(&self, id: &MessageId) -> Option<RowIndex> {
        if !self.contains(id) {
            return None;
        }
        self.locate(|record| record.id == *id)
    }

    /// Oldest (`Above`) or newest (`Below`) persisted record; pseudo rows are skipped.
    pub fn edge_record(&self, direction: Direction) -> Option<&MessageRecord> {
        match direction {
            Direction::Above => self.iter().map(|vm| &vm.record).find(|r| !r.is_pseudo()),
            Direction::Below => {
                let mut last = None;
                for key in self.dates.iter().rev() {
                    if let Some(rows) = self.buckets.get(key) {
                        last = rows.iter().rev().map(|vm| &vm.record).find(|r| !r.is_pseudo());
                    }
                    if last.is_some() {
                        break;
                    }
                }
                last
            }
        }
    }

    /// Bucket and id-set invariants hold.
    pub fn is_consistent(&self) -> bool {
        let ascending = self.dates.windows(2).all(|pair| pair[0] < pair[1]);
        if !ascending || self.dates.len() != self.buckets.len() {
            return false;
        }
        let mut seen = HashSet::with_capacity(self.loaded_ids.len());
        for key in &self.dates {
            let Some(rows) = self.buckets.get(key) else {
                return false;
            };
            if rows.is_empty() {
                return false;
            }
            for vm in rows {
                if !seen.insert(vm.record.id.clone()) {
                    return false;
                }
            }
        }
        seen == self.loaded_ids
    }

    // =========================================================================
    // Bulk mutation
    // =========================================================================

    /// Drop every row.
    pub fn clear(&mut self) {
        self.dates.clear();
        self.buckets.clear();
        self.loaded_ids.clear();
    }

    /// Group `records` into buckets that replace whatever was loaded.
    pub fn replace_all(&mut self, records: Vec<MessageRecord>) -> MergeOutcome {
        self.clear();
        let mut outcome = MergeOutcome::default();
        let mut grouped: BTreeMap<DateKey, Vec<MessageViewModel>> = BTreeMap::new();
        for record in records {
            if !self.loaded_ids.insert(record.id.clone()) {
                outcome.duplicates_dropped += 1;
                continue;
            }
            let key = self.key_of(&record);
            grouped.entry(key).or_default().push(MessageViewModel::unstyled(record));
        }
        for (key, mut rows) in grouped {
            rows.sort_by_key(|vm| order_key(&vm.record));
            let len = rows.len();
            restyle(&mut rows, 0, len, &self.ctx);
            outcome.rows_added += len;
            outcome.sections_added += 1;
            self.dates.push(key);
            self.buckets.insert(key, rows);
        }
        outcome
    }

    /// Drop duplicates and group an ascending page by date key.
    fn group_page(&mut self, records: Vec<MessageRecord>) -> (Vec<(DateKey, Vec<MessageViewModel>)>, usize) {
        let mut groups: Vec<(DateKey, Vec<MessageViewModel>)> = Vec::new();
        let mut dropped = 0;
        for record in records {
            if self.loaded_ids.contains(&record.id) {
                dropped += 1;
                continue;
            }
            self.loaded_ids.insert(record.id.clone());
            let key = self.key_of(&record);
            match groups.last_mut() {
                Some((last, rows)) if *last == key => rows.push(MessageViewModel::unstyled(record)),
                _ => groups.push((key, vec![MessageViewModel::unstyled(record)])),
            }
        }
        (groups, dropped)
    }

    /// Merge an ascending page of records older than everything loaded.
    ///
    /// Only the new rows and the first two rows of the bucket they join are
    /// restyled.
    pub fn prepend_page(&mut self, records: Vec<MessageRecord>) -> MergeOutcome {
        let (groups, dropped) = self.group_page(records);
        let mut outcome = MergeOutcome {
            duplicates_dropped: dropped,
            ..MergeOutcome::default()
        };
        for (key, mut rows) in groups.into_iter().rev() {
            let added = rows.len();
            outcome.rows_added += added;
            match self.buckets.get_mut(&key) {
                Some(existing) => {
                    rows.append(existing);
                    restyle(&mut rows, 0, added + 2, &self.ctx);
                    *existing = rows;
                }
                None => {
                    restyle(&mut rows, 0, added, &self.ctx);
                    let at = self.dates.partition_point(|d| *d < key);
                    self.dates.insert(at, key);
                    self.buckets.insert(key, rows);
                    outcome.sections_added += 1;
                }
            }
        }
        outcome
    }

    /// Merge an ascending page of records newer than everything loaded.
    ///
    /// Only the last two rows of the bucket they join and the new rows are
    /// restyled.
    pub fn append_page(&mut self, records: Vec<MessageRecord>) -> MergeOutcome {
        let (groups, dropped) = self.group_page(records);
        let mut outcome = MergeOutcome {
            duplicates_dropped: dropped,
            ..MergeOutcome::default()
        };
        for (key, rows) in groups {
            let added = rows.len();
            outcome.rows_added += added;
            match self.buckets.get_mut(&key) {
                Some(existing) => {
                    let from = existing.len().saturating_sub(2);
                    existing.extend(rows);
                    let to = existing.len();
                    restyle(existing, from, to, &self.ctx);
                }
                None => {
                    let mut rows = rows;
                    restyle(&mut rows, 0, added, &self.ctx);
                    let at = self.dates.partition_point(|d| *d < key);
                    self.dates.insert(at, key);
                    self.buckets.insert(key, rows);
                    outcome.sections_added += 1;
                }
            }
        }
        outcome
    }

    // =========================================================================
    // Single-row mutation
    // =========================================================================

    /// Insert a record in `(created_at, sequence_order)` order.
    ///
    /// Returns `None` when the id is already loaded. Only the inserted row
    /// and its immediate neighbours are restyled.
    pub fn insert(&mut self, record: MessageRecord) -> Option<InsertOutcome> {
        if self.loaded_ids.contains(&record.id) {
            return None;
        }
        self.loaded_ids.insert(record.id.clone());
        let key = self.key_of(&record);
        let section = self.dates.partition_point(|d| *d < key);
        let exists = self.dates.get(section) == Some(&key);
        if !exists {
            let mut rows = vec![MessageViewModel::unstyled(record)];
            restyle(&mut rows, 0, 1, &self.ctx);
            self.dates.insert(section, key);
            self.buckets.insert(key, rows);
            return Some(InsertOutcome {
                index: RowIndex::new(section, 0),
                new_section: true,
            });
        }
        let rows = self.buckets.entry(key).or_default();
        let sort = order_key(&record);
        let row = rows.partition_point(|vm| order_key(&vm.record) <= sort);
        rows.insert(row, MessageViewModel::unstyled(record));
        restyle(rows, row.saturating_sub(1), row + 2, &self.ctx);
        Some(InsertOutcome {
            index: RowIndex::new(section, row),
            new_section: false,
        })
    }

    /// Insert `record` directly before the row holding `target`.
    pub fn insert_before(&mut self, target: &MessageId, record: MessageRecord) -> Option<RowIndex> {
        if self.loaded_ids.contains(&record.id) {
            return None;
        }
        let at = self.position_of(target)?;
        let key = self.dates[at.section];
        let rows = self.buckets.get_mut(&key)?;
        self.loaded_ids.insert(record.id.clone());
        rows.insert(at.row, MessageViewModel::unstyled(record));
        restyle(rows, at.row.saturating_sub(1), at.row + 2, &self.ctx);
        Some(at)
    }

    /// Insert `record` as the very first row of the first bucket.
    pub fn insert_front(&mut self, record: MessageRecord) -> Option<RowIndex> {
        if self.loaded_ids.contains(&record.id) {
            return None;
        }
        self.loaded_ids.insert(record.id.clone());
        let key = match self.dates.first() {
            Some(first) => *first,
            None => {
                let key = self.key_of(&record);
                self.dates.push(key);
                key
            }
        };
        let rows = self.buckets.entry(key).or_default();
        rows.insert(0, MessageViewModel::unstyled(record));
        restyle(rows, 0, 2, &self.ctx);
        Some(RowIndex::new(0, 0))
    }

    /// Remove the row at an address.
    pub fn remove(&mut self, section: usize, row: usize) -> RemoveOutcome {
        let Some(key) = self.dates.get(section).copied() else {
            return RemoveOutcome::default();
        };
        let Some(rows) = self.buckets.get_mut(&key) else {
            return RemoveOutcome::default();
        };
        if row >= rows.len() {
            return RemoveOutcome::default();
        }
        let removed = rows.remove(row);
        self.loaded_ids.remove(&removed.record.id);
        if rows.is_empty() {
            self.buckets.remove(&key);
            self.dates.remove(section);
            return RemoveOutcome {
                row_removed: true,
                section_removed: true,
            };
        }
        restyle(rows, row.saturating_sub(1), row + 1, &self.ctx);
        RemoveOutcome {
            row_removed: true,
            section_removed: false,
        }
    }

    /// Mutate the record with `id` in place. Style flags are untouched.
    pub fn update<F>(&mut self, id: &MessageId, apply: F) -> Option<RowIndex>
    where
        F: FnOnce(&mut MessageRecord),
    {
        let at = self.position_of(id)?;
        let key = self.dates[at.section];
        let vm = self.buckets.get_mut(&key)?.get_mut(at.row)?;
        apply(&mut vm.record);
        Some(at)
    }

    /// Swap in a refreshed copy of a loaded record, keeping its style flags.
    pub fn replace_record(&mut self, record: MessageRecord) -> Option<RowIndex> {
        let id = record.id.clone();
        self.update(&id, move |slot| *slot = record)
    }
}
