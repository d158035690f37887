//! Purpose: Hold top-level CLI command dispatch for `zsetview`.
//! Exports: `dispatch_command`, `StoreTarget`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: CLI rows are 1-based; model indices are 0-based and converted here only.
//! Invariants: A partially loaded page is skipped with a notice, never printed.

use super::*;
use crate::row_json::{row_json, rows_envelope};
use clap::CommandFactory;
use zsetview::api::{
    AddOutcome, ConnectionConfig, ModelOptions, RemoteStore, RowInput, SortedSetWindowModel,
};
use zsetview::notice::notice_time_now;

pub(super) struct StoreTarget {
    pub(super) url: String,
    pub(super) db: Option<u32>,
}

impl StoreTarget {
    fn connect(&self) -> Result<(RemoteStore, u32), Error> {
        let mut config = ConnectionConfig::from_url(&self.url)?;
        if let Some(db) = self.db {
            config = config.with_db(db);
        }
        let db = config.db;
        Ok((RemoteStore::connect(config)?, db))
    }

    fn open(
        &self,
        key: &str,
        options: ModelOptions,
    ) -> Result<SortedSetWindowModel<RemoteStore>, Error> {
        let (store, db) = self.connect()?;
        SortedSetWindowModel::open_with(store, key, db, options)
    }
}

pub(super) fn dispatch_command(
    command: Command,
    target: StoreTarget,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "zsetview", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Count { key } => {
            let model = target.open(&key, ModelOptions::new())?;
            emit_json(json!({
                "key": key,
                "type": model.type_name(),
                "rows": model.row_count(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Rows {
            key,
            start,
            count,
            page_size,
        } => {
            let start = row_to_index(start)?;
            if page_size == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--page-size must be at least 1"));
            }
            let mut model = target.open(&key, ModelOptions::new().with_page_size(page_size))?;
            let total = model.row_count();
            let end = match count {
                Some(count) => start.saturating_add(count).min(total),
                None => total,
            };

            let mut rows = Vec::new();
            let mut index = start;
            while index < end {
                let page = page_size.min(end - index);
                match model.fetch_range(index, page) {
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::PartialData => {
                        emit_notice(&partial_page_notice(&key, index, page), color_mode);
                        index += page;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
                for row_index in index..index + page {
                    if let Some(row) = model.row(row_index) {
                        rows.push(row_json(row_index, row));
                    }
                }
                index += page;
            }

            emit_json(rows_envelope(&key, &model, rows));
            Ok(RunOutcome::ok())
        }
        Command::Add { key, member, score } => {
            let mut model = target.open(&key, ModelOptions::new())?;
            let outcome = model.add_row(&RowInput::new(member, score))?;
            let value = match outcome {
                AddOutcome::Added { index } => json!({
                    "key": key,
                    "outcome": "added",
                    "row": index + 1,
                    "rows": model.row_count(),
                }),
                AddOutcome::ScoreUpdated => json!({
                    "key": key,
                    "outcome": "score_updated",
                    "rows": model.row_count(),
                }),
            };
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Update {
            key,
            row,
            value,
            score,
        } => {
            if value.is_none() && score.is_none() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("update needs --value and/or --score")
                    .with_hint("Use `zsetview update <key> <row> --score 1.5`."));
            }
            let index = row_to_index(row)?;
            let mut model = target.open(&key, ModelOptions::new())?;
            model.load_rows(index)?;
            let cached = model.row(index).cloned().ok_or_else(|| {
                Error::new(ErrorKind::InvalidRow)
                    .with_message("row is not present in the store")
                    .with_key(&key)
                    .with_index(index)
            })?;
            let input = RowInput {
                value: Some(value.map_or(cached.member, Into::into)),
                score: Some(score.unwrap_or_else(|| cached.score.to_string())),
            };
            let outcome = model.update_row(index, &input)?;
            emit_json(json!({
                "key": key,
                "row": row,
                "member_changed": outcome.member_changed,
                "score_changed": outcome.score_changed,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Remove { key, row } => {
            let index = row_to_index(row)?;
            let mut model = target.open(&key, ModelOptions::new())?;
            model.load_rows(index)?;
            model.remove_row(index)?;
            emit_json(json!({
                "key": key,
                "row": row,
                "rows": model.row_count(),
                "removed_key": model.is_removed(),
            }));
            Ok(RunOutcome::ok())
        }
    }
}

fn row_to_index(row: u64) -> Result<u64, Error> {
    row.checked_sub(1).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("rows are numbered from 1")
            .with_hint("Use 1 for the lowest-scored member.")
    })
}

fn partial_page_notice(key: &str, start: u64, count: u64) -> Notice {
    let mut details = Map::new();
    details.insert("start_row".to_string(), json!(start + 1));
    details.insert("count".to_string(), json!(count));
    Notice {
        kind: "partial_data".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "rows".to_string(),
        key: key.to_string(),
        message: "data was loaded from the store partially; page skipped".to_string(),
        details,
    }
}
