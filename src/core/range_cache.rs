// Sparse row cache addressed by contiguous index ranges.
use crate::core::error::{Error, ErrorKind};
use std::collections::BTreeMap;
use std::ops::Range;

/// Rows materialized locally, keyed by the first index of each contiguous range.
///
/// Ranges never overlap and are never empty. Adjacent ranges are coalesced on merge.
#[derive(Clone, Debug)]
pub struct RangeCache<T> {
    ranges: BTreeMap<u64, Vec<T>>,
}

impl<T> RangeCache<T> {
    pub fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of rows currently cached across all ranges.
    pub fn loaded_len(&self) -> u64 {
        self.ranges.values().map(|rows| rows.len() as u64).sum()
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.ranges
            .iter()
            .map(|(start, rows)| *start..*start + rows.len() as u64)
    }

    pub fn is_loaded(&self, index: u64) -> bool {
        self.locate(index).is_some()
    }

    pub fn get(&self, index: u64) -> Result<&T, Error> {
        let (start, offset) = self.locate(index).ok_or_else(|| not_loaded(index))?;
        self.ranges
            .get(&start)
            .and_then(|rows| rows.get(offset))
            .ok_or_else(|| not_loaded(index))
    }

    /// Overwrites a cached row, returning the previous value.
    pub fn replace(&mut self, index: u64, row: T) -> Result<T, Error> {
        let (start, offset) = self.locate(index).ok_or_else(|| not_loaded(index))?;
        let slot = self
            .ranges
            .get_mut(&start)
            .and_then(|rows| rows.get_mut(offset))
            .ok_or_else(|| not_loaded(index))?;
        Ok(std::mem::replace(slot, row))
    }

    /// Places `row` at `index`, the logical end of the collection as known by the caller.
    ///
    /// Anything cached at or beyond `index` is discarded first. The row joins the range
    /// ending right before it when there is one.
    pub fn append(&mut self, index: u64, row: T) {
        self.truncate_from(index);
        if let Some((start, rows)) = self.ranges.range_mut(..index).next_back() {
            if *start + rows.len() as u64 == index {
                rows.push(row);
                return;
            }
        }
        self.ranges.insert(index, vec![row]);
    }

    /// Removes the row at `index`.
    ///
    /// Rows after it in the same range shift down by one. Ranges past the containing one
    /// are dropped: their positions can no longer be trusted and must be fetched again.
    pub fn remove_at(&mut self, index: u64) -> Result<T, Error> {
        let (start, offset) = self.locate(index).ok_or_else(|| not_loaded(index))?;
        drop(self.ranges.split_off(&(start + 1)));
        let rows = self
            .ranges
            .get_mut(&start)
            .ok_or_else(|| not_loaded(index))?;
        let row = rows.remove(offset);
        if rows.is_empty() {
            self.ranges.remove(&start);
        }
        Ok(row)
    }

    /// Stores a freshly fetched contiguous range. Overlapped rows are replaced.
    pub fn merge_range(&mut self, start: u64, rows: Vec<T>) {
        if rows.is_empty() {
            return;
        }
        let end = start + rows.len() as u64;
        self.evict(start..end);
        self.ranges.insert(start, rows);
        self.coalesce(start);
    }

    /// Drops cached rows inside `span`, splitting ranges that straddle its edges.
    pub fn evict(&mut self, span: Range<u64>) {
        if span.start >= span.end {
            return;
        }

        if let Some((&start, rows)) = self.ranges.range_mut(..span.start).next_back() {
            let end = start + rows.len() as u64;
            if end > span.start {
                let mut tail = rows.split_off((span.start - start) as usize);
                if end > span.end {
                    let beyond = tail.split_off((span.end - span.start) as usize);
                    self.ranges.insert(span.end, beyond);
                }
            }
        }

        let inside: Vec<u64> = self
            .ranges
            .range(span.start..span.end)
            .map(|(start, _)| *start)
            .collect();
        for start in inside {
            let Some(mut rows) = self.ranges.remove(&start) else {
                continue;
            };
            if start + rows.len() as u64 > span.end {
                let beyond = rows.split_off((span.end - start) as usize);
                self.ranges.insert(span.end, beyond);
            }
        }
    }

    pub fn truncate_from(&mut self, index: u64) {
        self.evict(index..u64::MAX);
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    fn locate(&self, index: u64) -> Option<(u64, usize)> {
        let (start, rows) = self.ranges.range(..=index).next_back()?;
        let offset = index - start;
        if offset < rows.len() as u64 {
            Some((*start, offset as usize))
        } else {
            None
        }
    }

    fn coalesce(&mut self, start: u64) {
        if !self.ranges.contains_key(&start) {
            return;
        }
        let mut start = start;

        let previous = self
            .ranges
            .range(..start)
            .next_back()
            .map(|(prev_start, rows)| (*prev_start, *prev_start + rows.len() as u64));
        if let Some((prev_start, prev_end)) = previous {
            if prev_end == start {
                if let Some(rows) = self.ranges.remove(&start) {
                    if let Some(prev) = self.ranges.get_mut(&prev_start) {
                        prev.extend(rows);
                    }
                    start = prev_start;
                }
            }
        }

        let end = start + self.ranges.get(&start).map_or(0, |rows| rows.len() as u64);
        if end == start {
            return;
        }
        if let Some(next) = self.ranges.remove(&end) {
            if let Some(rows) = self.ranges.get_mut(&start) {
                rows.extend(next);
            }
        }
    }
}

impl<T> Default for RangeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn not_loaded(index: u64) -> Error {
    Error::new(ErrorKind::IndexNotLoaded)
        .with_message("row is not cached")
        .with_index(index)
}
