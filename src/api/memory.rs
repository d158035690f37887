//! Purpose: In-process test double answering the four sorted-set commands a model issues.
//! Exports: `MemoryStore`.
//! Role: Backs unit tests and the loopback server in integration tests; not a store product.
//! Invariants: Ordering is ascending score, ties broken by member bytes.
//! Invariants: ZADD replies 1 for a new member and 0 for a score update.
//! Invariants: A set that loses its last member no longer exists (ZCARD 0).
#![allow(clippy::result_large_err)]

use super::store::{ApiResult, Command, StoreClient};
use crate::core::codec::parse_score;
use crate::core::resp::Reply;
use bstr::ByteSlice;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Test double for `StoreClient`: just enough of a sorted set to exercise the model.
///
/// Hidden from the documented API; it implements no persistence, expiry, or other commands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<BTreeMap<(u32, Vec<u8>), SortedSet>>,
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<Vec<u8>, f64>,
    order: BTreeSet<(Score, Vec<u8>)>,
}

#[derive(Clone, Copy, Debug)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl SortedSet {
    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true when the member was not present before.
    fn insert(&mut self, member: &[u8], score: f64) -> bool {
        let previous = self.scores.insert(member.to_vec(), score);
        if let Some(old) = previous {
            self.order.remove(&(Score(old), member.to_vec()));
        }
        self.order.insert((Score(score), member.to_vec()));
        previous.is_none()
    }

    fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(Score(score), member.to_vec()));
                true
            }
            None => false,
        }
    }

    fn range(&self, start: i64, stop: i64) -> Vec<Reply> {
        let len = self.len() as i64;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Vec::new();
        }
        let take = (stop - start + 1) as usize;
        self.order
            .iter()
            .skip(start as usize)
            .take(take)
            .flat_map(|(score, member)| {
                [
                    Reply::Bulk(member.clone()),
                    Reply::Bulk(format_score(score.0).into_bytes()),
                ]
            })
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing the command path.
    pub fn seed<M, I>(&self, db: u32, key: &[u8], rows: I)
    where
        M: AsRef<[u8]>,
        I: IntoIterator<Item = (M, f64)>,
    {
        let mut sets = self.lock();
        let set = sets.entry((db, key.to_vec())).or_default();
        for (member, score) in rows {
            set.insert(member.as_ref(), score);
        }
        if set.len() == 0 {
            sets.remove(&(db, key.to_vec()));
        }
    }

    pub fn len(&self, db: u32, key: &[u8]) -> usize {
        self.lock()
            .get(&(db, key.to_vec()))
            .map_or(0, SortedSet::len)
    }

    pub fn is_empty(&self, db: u32, key: &[u8]) -> bool {
        self.len(db, key) == 0
    }

    /// Members in store order with their formatted scores.
    pub fn members(&self, db: u32, key: &[u8]) -> Vec<(Vec<u8>, String)> {
        self.lock()
            .get(&(db, key.to_vec()))
            .map(|set| {
                set.order
                    .iter()
                    .map(|(score, member)| (member.clone(), format_score(score.0)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dispatches one command given as raw wire arguments, name first.
    pub fn execute_args(&self, db: u32, args: &[Vec<u8>]) -> Reply {
        let Some((name, rest)) = args.split_first() else {
            return Reply::Error("ERR empty command".to_string());
        };
        let name = name.to_ascii_uppercase();
        match (name.as_slice(), rest) {
            (b"ZCARD", [key]) => Reply::Integer(self.len(db, key) as i64),
            (b"ZRANGE", [key, start, stop, withscores])
                if withscores.eq_ignore_ascii_case(b"WITHSCORES") =>
            {
                let (Some(start), Some(stop)) = (parse_index(start), parse_index(stop)) else {
                    return Reply::Error(
                        "ERR value is not an integer or out of range".to_string(),
                    );
                };
                let sets = self.lock();
                match sets.get(&(db, key.clone())) {
                    Some(set) => Reply::Array(set.range(start, stop)),
                    None => Reply::Array(Vec::new()),
                }
            }
            (b"ZADD", [key, score, member]) => {
                let Ok(score) = parse_score(score) else {
                    return Reply::Error("ERR value is not a valid float".to_string());
                };
                let mut sets = self.lock();
                let set = sets.entry((db, key.clone())).or_default();
                Reply::Integer(i64::from(set.insert(member, score)))
            }
            (b"ZREM", [key, member]) => {
                let mut sets = self.lock();
                let entry = (db, key.clone());
                let Some(set) = sets.get_mut(&entry) else {
                    return Reply::Integer(0);
                };
                let removed = set.remove(member);
                if set.len() == 0 {
                    sets.remove(&entry);
                }
                Reply::Integer(i64::from(removed))
            }
            _ => Reply::Error(format!(
                "ERR unknown command or wrong number of arguments for '{}'",
                name.as_bstr()
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(u32, Vec<u8>), SortedSet>> {
        self.sets
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl StoreClient for MemoryStore {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        Ok(self.execute_args(db, &command.to_args()))
    }
}

fn parse_index(raw: &[u8]) -> Option<i64> {
    raw.to_str().ok()?.parse().ok()
}

/// Shortest text form of a score, `inf`/`-inf` for infinities.
fn format_score(score: f64) -> String {
    if score.is_infinite() {
        return if score > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    score.to_string()
}
