//! Purpose: Row-indexed, lazily paged view over one remote sorted set.
//! Exports: `SortedSetWindowModel`, `Field`, `FieldValue`, `AddOutcome`, `UpdateOutcome`,
//! `KeyState`, `ModelOptions`.
//! Role: Orchestrates fetch-on-demand and row mutations over a `StoreClient`.
//! Invariants: Remote commands run first; the cache changes only after they succeed.
//! Invariants: Row count never drops below the number of cached rows.
//! Invariants: Reading an unloaded row yields `None`, never a stale or default value.
//! Invariants: One owner at a time; the model has no internal locking.
#![allow(clippy::result_large_err)]

use super::notify::{ModelEvent, Notifier};
use super::store::{ApiResult, Command, StoreClient, expect_flat_values, expect_integer};
use crate::core::codec::{Row, RowInput, decode_fetch_response, parse_score};
use crate::core::error::{Error, ErrorKind};
use crate::core::range_cache::RangeCache;
use bstr::{BStr, BString, ByteSlice};
use std::sync::mpsc::Sender;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Columns exposed per row, in display order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Field {
    RowNumber,
    Member,
    Score,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::RowNumber, Field::Member, Field::Score];

    pub fn column_name(self) -> &'static str {
        match self {
            Field::RowNumber => "row",
            Field::Member => "value",
            Field::Score => "score",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// 1-based display position.
    RowNumber(u64),
    Member(BString),
    Score(f64),
}

/// What the store did with an ADD: a real protocol signal, not a flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    Added { index: u64 },
    ScoreUpdated,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateOutcome {
    pub member_changed: bool,
    pub score_changed: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyState {
    Active,
    Removed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModelOptions {
    page_size: u64,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rows per page-aligned fetch; never zero.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SortedSetWindowModel<C> {
    client: C,
    key: BString,
    db: u32,
    options: ModelOptions,
    row_count: u64,
    cache: RangeCache<Row>,
    state: KeyState,
    notifier: Notifier,
}

impl<C: StoreClient> SortedSetWindowModel<C> {
    pub fn open(client: C, key: impl Into<BString>, db: u32) -> ApiResult<Self> {
        Self::open_with(client, key, db, ModelOptions::new())
    }

    /// Opens a view and reads the current size of the set.
    pub fn open_with(
        client: C,
        key: impl Into<BString>,
        db: u32,
        options: ModelOptions,
    ) -> ApiResult<Self> {
        let mut model = Self {
            client,
            key: key.into(),
            db,
            options,
            row_count: 0,
            cache: RangeCache::new(),
            state: KeyState::Active,
            notifier: Notifier::default(),
        };
        model.row_count = model.remote_count()?;
        debug!(key = %model.key, db, rows = model.row_count, "opened sorted set view");
        Ok(model)
    }

    pub fn with_events(mut self, sender: Sender<ModelEvent>) -> Self {
        self.notifier = Notifier::new(sender);
        self
    }

    pub fn type_name(&self) -> &'static str {
        "zset"
    }

    pub fn column_names(&self) -> [&'static str; 3] {
        Field::ALL.map(Field::column_name)
    }

    pub fn roles(&self) -> [(Field, &'static str); 3] {
        Field::ALL.map(|field| (field, field.column_name()))
    }

    pub fn key(&self) -> &BStr {
        self.key.as_bstr()
    }

    pub fn db(&self) -> u32 {
        self.db
    }

    pub fn options(&self) -> ModelOptions {
        self.options
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    pub fn is_removed(&self) -> bool {
        self.state == KeyState::Removed
    }

    pub fn is_row_loaded(&self, index: u64) -> bool {
        self.cache.is_loaded(index)
    }

    pub fn loaded_rows(&self) -> u64 {
        self.cache.loaded_len()
    }

    pub fn row(&self, index: u64) -> Option<&Row> {
        self.cache.get(index).ok()
    }

    /// Reads one field of a cached row; `Ok(None)` means the row is not loaded yet.
    pub fn data(&self, index: u64, field: Field) -> ApiResult<Option<FieldValue>> {
        let Some(row) = self.row(index) else {
            return Ok(None);
        };
        let value = match field {
            Field::RowNumber => FieldValue::RowNumber(index + 1),
            Field::Member => FieldValue::Member(row.member.clone()),
            Field::Score => FieldValue::Score(
                row.score_value()
                    .map_err(|err| err.with_key(&self.key).with_index(index))?,
            ),
        };
        Ok(Some(value))
    }

    /// Fetches `count` rows starting at `start` and merges them into the cache.
    ///
    /// Nothing is merged when the store fails or the reply is truncated.
    pub fn fetch_range(&mut self, start: u64, count: u64) -> ApiResult<u64> {
        let result = self.fetch_range_inner(start, count);
        self.report(result)
    }

    /// Loads the page containing `index` unless that row is already cached.
    pub fn load_rows(&mut self, index: u64) -> ApiResult<()> {
        if self.cache.is_loaded(index) {
            return Ok(());
        }
        if index >= self.row_count {
            let err = Error::new(ErrorKind::InvalidRow)
                .with_message(format!("row is beyond the last of {} rows", self.row_count))
                .with_key(&self.key)
                .with_index(index);
            return self.report(Err(err));
        }
        let page = self.options.page_size();
        let page_start = index / page * page;
        let count = page.min(self.row_count - page_start);
        self.fetch_range(page_start, count).map(|_| ())
    }

    pub fn add_row(&mut self, input: &RowInput) -> ApiResult<AddOutcome> {
        let result = self.add_row_inner(input);
        self.report(result)
    }

    pub fn update_row(&mut self, index: u64, input: &RowInput) -> ApiResult<UpdateOutcome> {
        let result = self.update_row_inner(index, input);
        self.report(result)
    }

    pub fn remove_row(&mut self, index: u64) -> ApiResult<()> {
        let result = self.remove_row_inner(index);
        self.report(result)
    }

    /// Re-reads the set size and drops every cached row.
    ///
    /// A removed key becomes active again only once the store holds rows for it.
    pub fn reload(&mut self) -> ApiResult<()> {
        let result = self.remote_count();
        let count = self.report(result)?;
        self.cache.clear();
        self.row_count = count;
        if count > 0 {
            self.state = KeyState::Active;
        }
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn close(self) {
        debug!(key = %self.key, db = self.db, "closed sorted set view");
    }

    fn fetch_range_inner(&mut self, start: u64, count: u64) -> ApiResult<u64> {
        self.ensure_active()?;
        if count == 0 {
            return Ok(0);
        }
        let stop = start
            .checked_add(count - 1)
            .and_then(|stop| i64::try_from(stop).ok());
        let (Ok(start_index), Some(stop_index)) = (i64::try_from(start), stop) else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("fetch range exceeds the addressable row space")
                .with_index(start));
        };

        let command = Command::Range {
            key: &self.key,
            start: start_index,
            stop: stop_index,
        };
        let reply = self.client.execute(self.db, &command)?;
        let values = expect_flat_values(reply, &command)?;
        let rows = decode_fetch_response(values, start).map_err(|err| {
            warn!(key = %self.key, start, "discarding partially loaded range");
            err.with_key(&self.key)
        })?;

        let fetched = rows.len() as u64;
        self.cache.merge_range(start, rows);
        self.row_count = self.row_count.max(start + fetched);
        debug!(key = %self.key, start, fetched, "merged range");
        self.notifier.emit(ModelEvent::RowsLoaded {
            start,
            count: fetched,
        });
        Ok(fetched)
    }

    fn add_row_inner(&mut self, input: &RowInput) -> ApiResult<AddOutcome> {
        self.ensure_active()?;
        let row = input.validate()?;
        let created = self.remote_add(&row)?;
        if !created {
            self.notifier.emit(ModelEvent::ScoreUpdated);
            return Ok(AddOutcome::ScoreUpdated);
        }
        let index = self.row_count;
        self.cache.append(index, row);
        self.row_count += 1;
        self.notifier.emit(ModelEvent::RowAdded { index });
        Ok(AddOutcome::Added { index })
    }

    fn update_row_inner(&mut self, index: u64, input: &RowInput) -> ApiResult<UpdateOutcome> {
        self.ensure_active()?;
        let cached = self.cache.get(index).cloned().map_err(|_| {
            Error::new(ErrorKind::InvalidRow)
                .with_message("row is not loaded")
                .with_key(&self.key)
                .with_index(index)
        })?;
        let row = input.validate()?;

        let outcome = UpdateOutcome {
            member_changed: cached.member != row.member,
            score_changed: score_changed(&cached.score, &row.score),
        };
        let updated = Row::new(
            if outcome.member_changed {
                row.member
            } else {
                cached.member.clone()
            },
            if outcome.score_changed {
                row.score
            } else {
                cached.score.clone()
            },
        );

        // No single-command rename exists, so every edit is ZREM followed by ZADD.
        self.remote_remove(&cached.member)?;
        if let Err(err) = self.remote_add(&updated) {
            warn!(
                key = %self.key,
                member = %cached.member,
                "update removed the old row but failed to add the new one"
            );
            return Err(err);
        }

        self.cache.replace(index, updated)?;
        self.notifier.emit(ModelEvent::RowUpdated { index });
        Ok(outcome)
    }

    fn remove_row_inner(&mut self, index: u64) -> ApiResult<()> {
        self.ensure_active()?;
        let member = match self.cache.get(index) {
            Ok(row) => row.member.clone(),
            Err(_) => {
                return Err(Error::new(ErrorKind::InvalidRow)
                    .with_message("row is not loaded")
                    .with_key(&self.key)
                    .with_index(index));
            }
        };

        let removed = self.remote_remove(&member)?;
        if removed == 0 {
            debug!(key = %self.key, member = %member, "member was already gone remotely");
        }

        self.row_count = self.row_count.saturating_sub(1);
        self.cache.remove_at(index)?;
        self.notifier.emit(ModelEvent::RowRemoved { index });
        if self.row_count == 0 {
            self.mark_removed();
        }
        Ok(())
    }

    fn mark_removed(&mut self) {
        if self.state == KeyState::Removed {
            return;
        }
        self.state = KeyState::Removed;
        self.cache.clear();
        debug!(key = %self.key, db = self.db, "sorted set became empty");
        self.notifier.emit(ModelEvent::KeyRemoved);
    }

    fn ensure_active(&self) -> ApiResult<()> {
        if self.state == KeyState::Removed {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("key was removed")
                .with_hint("Reload the view to pick up a recreated key.")
                .with_key(&self.key));
        }
        Ok(())
    }

    fn remote_count(&self) -> ApiResult<u64> {
        let command = Command::Count { key: &self.key };
        let reply = self.client.execute(self.db, &command)?;
        let count = expect_integer(reply, &command)?;
        u64::try_from(count).map_err(|_| {
            Error::new(ErrorKind::Remote)
                .with_message(format!("store reported negative size {count}"))
                .with_key(&self.key)
        })
    }

    /// Returns true when the store created a new member.
    fn remote_add(&self, row: &Row) -> ApiResult<bool> {
        let command = Command::Add {
            key: &self.key,
            score: &row.score,
            member: &row.member,
        };
        let reply = self.client.execute(self.db, &command)?;
        Ok(expect_integer(reply, &command)? == 1)
    }

    fn remote_remove(&self, member: &[u8]) -> ApiResult<i64> {
        let command = Command::Remove {
            key: &self.key,
            member,
        };
        let reply = self.client.execute(self.db, &command)?;
        expect_integer(reply, &command)
    }

    fn report<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(err) = &result {
            if err.kind() == ErrorKind::Remote {
                warn!(key = %self.key, error = %err, "store command failed");
            }
            self.notifier.emit(ModelEvent::failed(err));
        }
        result
    }
}

fn score_changed(cached: &[u8], new: &[u8]) -> bool {
    match (parse_score(cached), parse_score(new)) {
        (Ok(old), Ok(new)) => old != new,
        _ => cached.trim() != new.trim(),
    }
}
