//! Purpose: End-to-end tests for the window model against a recording store.
//! Exports: None (integration test module).
//! Role: Validate fetch/merge, mutations, and failure isolation at the command level.
//! Invariants: Every command the model issues is logged in order, ZCARD at open included.
//! Invariants: Injected failures leave the model usable for later calls.

use std::cell::RefCell;
use std::sync::mpsc;
use zsetview::api::{
    AddOutcome, ApiResult, Command, Error, ErrorKind, Field, FieldValue, KeyState, MemoryStore,
    ModelEvent, Reply, RowInput, SortedSetWindowModel, StoreClient,
};

struct ScriptedStore {
    backend: MemoryStore,
    log: RefCell<Vec<String>>,
    fail_on: RefCell<Option<&'static str>>,
    range_reply: RefCell<Option<Reply>>,
}

impl ScriptedStore {
    fn with_rows(rows: &[(&str, f64)]) -> Self {
        let backend = MemoryStore::new();
        backend.seed(0, b"board", rows.iter().copied());
        Self {
            backend,
            log: RefCell::new(Vec::new()),
            fail_on: RefCell::new(None),
            range_reply: RefCell::new(None),
        }
    }

    fn fail_on(&self, command: &'static str) {
        *self.fail_on.borrow_mut() = Some(command);
    }

    fn heal(&self) {
        *self.fail_on.borrow_mut() = None;
        *self.range_reply.borrow_mut() = None;
    }

    fn reply_to_range(&self, reply: Reply) {
        *self.range_reply.borrow_mut() = Some(reply);
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

impl StoreClient for ScriptedStore {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        let line = command
            .to_args()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        self.log.borrow_mut().push(line);

        if *self.fail_on.borrow() == Some(command.name()) {
            return Err(Error::new(ErrorKind::Remote).with_message("connection error: reset by peer"));
        }
        if let Command::Range { .. } = command {
            if let Some(reply) = self.range_reply.borrow().clone() {
                return Ok(reply);
            }
        }
        self.backend.execute(db, command)
    }
}

fn member(model: &SortedSetWindowModel<&ScriptedStore>, index: u64) -> Option<FieldValue> {
    model.data(index, Field::Member).expect("data")
}

fn bulk(text: &str) -> Reply {
    Reply::Bulk(text.as_bytes().to_vec())
}

#[test]
fn open_reads_count_and_loads_nothing() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
    let model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    assert_eq!(model.row_count(), 3);
    assert_eq!(model.loaded_rows(), 0);
    assert_eq!(store.take_log(), vec!["ZCARD board"]);
}

#[test]
fn rows_outside_merged_ranges_are_not_available() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    let fetched = model.fetch_range(1, 2).expect("fetch");
    assert_eq!(fetched, 2);
    assert_eq!(store.take_log(), vec!["ZCARD board", "ZRANGE board 1 2 WITHSCORES"]);

    for index in [0, 3, 4, 100] {
        for field in Field::ALL {
            assert_eq!(model.data(index, field).expect("data"), None);
        }
    }
    assert_eq!(member(&model, 1), Some(FieldValue::Member("b".into())));
    assert_eq!(
        model.data(2, Field::Score).expect("data"),
        Some(FieldValue::Score(3.0))
    );
}

#[test]
fn truncated_range_reply_is_discarded() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let (tx, rx) = mpsc::channel();
    let mut model = SortedSetWindowModel::open(&store, "board", 0)
        .expect("open")
        .with_events(tx);
    store.reply_to_range(Reply::Array(vec![bulk("a"), bulk("1"), bulk("b")]));

    let err = model.fetch_range(0, 2).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::PartialData);
    assert!(!model.is_row_loaded(0));
    assert!(!model.is_row_loaded(1));
    assert_eq!(model.loaded_rows(), 0);
    assert!(matches!(
        rx.try_recv().expect("event"),
        ModelEvent::Failed {
            kind: ErrorKind::PartialData,
            ..
        }
    ));

    store.heal();
    model.fetch_range(0, 2).expect("refetch");
    assert_eq!(model.loaded_rows(), 2);
}

#[test]
fn connection_failure_during_fetch_loads_nothing() {
    let rows: Vec<(String, f64)> = (0..12).map(|i| (format!("m{i}"), i as f64)).collect();
    let backend_rows: Vec<(&str, f64)> = rows.iter().map(|(m, s)| (m.as_str(), *s)).collect();
    let store = ScriptedStore::with_rows(&backend_rows);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    store.fail_on("ZRANGE");

    let err = model.fetch_range(5, 5).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(err.message(), Some("connection error: reset by peer"));
    for index in 5..=9 {
        assert!(!model.is_row_loaded(index));
    }
    assert_eq!(model.row_count(), 12);
}

#[test]
fn add_of_new_member_appends_loaded_row() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 2).expect("fetch");
    store.take_log();

    let outcome = model.add_row(&RowInput::new("c", "3")).expect("add");
    assert_eq!(outcome, AddOutcome::Added { index: 2 });
    assert_eq!(store.take_log(), vec!["ZADD board 3 c"]);
    assert_eq!(model.row_count(), 3);
    assert_eq!(member(&model, 2), Some(FieldValue::Member("c".into())));
}

#[test]
fn add_of_existing_member_changes_nothing_locally() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 2).expect("fetch");

    let outcome = model.add_row(&RowInput::new("a", "10")).expect("add");
    assert_eq!(outcome, AddOutcome::ScoreUpdated);
    assert_eq!(model.row_count(), 2);
    assert_eq!(model.loaded_rows(), 2);
    assert!(!model.is_row_loaded(2));
    assert_eq!(
        model.data(0, Field::Score).expect("data"),
        Some(FieldValue::Score(1.0))
    );
}

#[test]
fn invalid_add_issues_no_command() {
    let store = ScriptedStore::with_rows(&[("a", 1.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    store.take_log();

    for input in [
        RowInput::new("", "1"),
        RowInput::new("x", ""),
        RowInput::new("x", "not-a-number"),
        RowInput::default(),
    ] {
        let err = model.add_row(&input).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::InvalidRow);
    }
    assert!(store.take_log().is_empty());
    assert_eq!(model.row_count(), 1);
}

#[test]
fn failed_add_leaves_model_unchanged() {
    let store = ScriptedStore::with_rows(&[("a", 1.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    store.fail_on("ZADD");

    let err = model.add_row(&RowInput::new("b", "2")).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(model.row_count(), 1);
    assert_eq!(model.loaded_rows(), 0);
}

#[test]
fn remove_decrements_and_marks_removed_once() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let (tx, rx) = mpsc::channel();
    let mut model = SortedSetWindowModel::open(&store, "board", 0)
        .expect("open")
        .with_events(tx);
    model.fetch_range(0, 2).expect("fetch");
    store.take_log();

    model.remove_row(0).expect("remove");
    assert_eq!(store.take_log(), vec!["ZREM board a"]);
    assert_eq!(model.row_count(), 1);
    assert_eq!(member(&model, 0), Some(FieldValue::Member("b".into())));
    assert_eq!(model.state(), KeyState::Active);

    model.remove_row(0).expect("remove");
    assert_eq!(model.row_count(), 0);
    assert_eq!(model.state(), KeyState::Removed);

    let events: Vec<ModelEvent> = rx.try_iter().collect();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == ModelEvent::KeyRemoved)
            .count(),
        1
    );
    assert_eq!(events.last(), Some(&ModelEvent::KeyRemoved));
}

#[test]
fn remove_of_unloaded_row_is_rejected_without_commands() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    store.take_log();

    let err = model.remove_row(1).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::InvalidRow);
    assert!(store.take_log().is_empty());
    assert_eq!(model.row_count(), 2);
}

#[test]
fn failed_remove_keeps_cache_and_count() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 2).expect("fetch");
    store.fail_on("ZREM");

    let err = model.remove_row(0).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(model.row_count(), 2);
    assert_eq!(member(&model, 0), Some(FieldValue::Member("a".into())));
    assert_eq!(model.state(), KeyState::Active);
}

#[test]
fn update_of_unloaded_or_invalid_row_issues_no_command() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 1).expect("fetch");
    store.take_log();

    let err = model
        .update_row(1, &RowInput::new("b2", "2"))
        .expect_err("unloaded");
    assert_eq!(err.kind(), ErrorKind::InvalidRow);

    let err = model
        .update_row(0, &RowInput::new("a2", "abc"))
        .expect_err("invalid");
    assert_eq!(err.kind(), ErrorKind::InvalidRow);

    let err = model
        .update_row(0, &RowInput {
            value: Some("a2".into()),
            score: None,
        })
        .expect_err("missing score");
    assert_eq!(err.kind(), ErrorKind::InvalidRow);

    assert!(store.take_log().is_empty());
}

#[test]
fn update_removes_then_adds_and_rewrites_cached_row() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 2).expect("fetch");
    store.take_log();

    let outcome = model
        .update_row(0, &RowInput::new("a2", "1.5"))
        .expect("update");
    assert!(outcome.member_changed);
    assert!(outcome.score_changed);
    assert_eq!(store.take_log(), vec!["ZREM board a", "ZADD board 1.5 a2"]);
    assert_eq!(
        model.data(0, Field::Score).expect("data"),
        Some(FieldValue::Score(1.5))
    );
    assert_eq!(member(&model, 0), Some(FieldValue::Member("a2".into())));
    assert_eq!(model.row_count(), 2);
    assert_eq!(
        store.backend.members(0, b"board"),
        vec![
            (b"a2".to_vec(), "1.5".to_string()),
            (b"b".to_vec(), "2".to_string()),
        ]
    );
}

#[test]
fn score_only_update_still_issues_both_commands() {
    let store = ScriptedStore::with_rows(&[("a", 1.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 1).expect("fetch");
    store.take_log();

    let outcome = model
        .update_row(0, &RowInput::new("a", "4"))
        .expect("update");
    assert!(!outcome.member_changed);
    assert!(outcome.score_changed);
    assert_eq!(store.take_log(), vec!["ZREM board a", "ZADD board 4 a"]);
}

#[test]
fn update_failure_after_remove_leaves_cache_untouched() {
    let store = ScriptedStore::with_rows(&[("a", 1.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 1).expect("fetch");
    store.take_log();
    store.fail_on("ZADD");

    let err = model
        .update_row(0, &RowInput::new("z", "9"))
        .expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(store.take_log(), vec!["ZREM board a", "ZADD board 9 z"]);
    assert_eq!(member(&model, 0), Some(FieldValue::Member("a".into())));
}

#[test]
fn removal_invalidates_ranges_past_the_removed_rows_range() {
    let rows: Vec<(String, f64)> = (0..30).map(|i| (format!("m{i:02}"), i as f64)).collect();
    let backend_rows: Vec<(&str, f64)> = rows.iter().map(|(m, s)| (m.as_str(), *s)).collect();
    let store = ScriptedStore::with_rows(&backend_rows);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");
    model.fetch_range(0, 10).expect("fetch");
    model.fetch_range(20, 10).expect("fetch");

    model.remove_row(3).expect("remove");
    assert_eq!(model.row_count(), 29);
    assert_eq!(member(&model, 3), Some(FieldValue::Member("m04".into())));
    assert!(model.is_row_loaded(8));
    assert!(!model.is_row_loaded(9));
    assert!(!model.is_row_loaded(20));

    model.fetch_range(19, 10).expect("refetch");
    assert_eq!(member(&model, 19), Some(FieldValue::Member("m20".into())));
}

#[test]
fn model_stays_usable_after_each_error_kind() {
    let store = ScriptedStore::with_rows(&[("a", 1.0), ("b", 2.0)]);
    let mut model = SortedSetWindowModel::open(&store, "board", 0).expect("open");

    store.fail_on("ZRANGE");
    model.fetch_range(0, 2).expect_err("remote");
    store.heal();
    store.reply_to_range(Reply::Array(vec![bulk("a")]));
    model.fetch_range(0, 2).expect_err("partial");
    store.heal();
    model.add_row(&RowInput::new("", "")).expect_err("invalid");

    model.fetch_range(0, 2).expect("fetch");
    assert_eq!(model.loaded_rows(), 2);
    model.add_row(&RowInput::new("c", "3")).expect("add");
    assert_eq!(model.row_count(), 3);
}
