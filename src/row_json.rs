//! Purpose: JSON serializers for rows shown by the `rows` command.
//! Exports: `row_json`, `rows_envelope`.
//! Role: Keep row envelope shape consistent across commands.
//! Invariants: Stable key names `row`, `value`, `score`; `row` is 1-based.
//! Invariants: Scores are numbers when finite and numeric, otherwise the store's raw text.

use bstr::ByteSlice;
use serde::Serialize;
use serde_json::{Value, json};
use std::borrow::Cow;
use zsetview::api::{Row, SortedSetWindowModel, StoreClient};

#[derive(Serialize)]
struct RowJson<'a> {
    row: u64,
    value: Cow<'a, str>,
    score: ScoreJson<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ScoreJson<'a> {
    Number(f64),
    Text(Cow<'a, str>),
}

pub(crate) fn row_json(index: u64, row: &Row) -> Value {
    let score = match row.score_value() {
        Ok(score) if score.is_finite() => ScoreJson::Number(score),
        _ => ScoreJson::Text(row.score.to_str_lossy()),
    };
    let body = RowJson {
        row: index + 1,
        value: row.member.to_str_lossy(),
        score,
    };
    serde_json::to_value(body).unwrap_or(Value::Null)
}

pub(crate) fn rows_envelope<C: StoreClient>(
    key: &str,
    model: &SortedSetWindowModel<C>,
    rows: Vec<Value>,
) -> Value {
    json!({
        "key": key,
        "type": model.type_name(),
        "columns": model.column_names(),
        "total": model.row_count(),
        "rows": rows,
    })
}

#[cfg(test)]
mod tests {
    use super::row_json;
    use zsetview::api::Row;

    #[test]
    fn row_json_uses_display_row_and_numeric_score() {
        let value = row_json(0, &Row::new("alice", "1.5"));
        assert_eq!(value["row"], 1);
        assert_eq!(value["value"], "alice");
        assert_eq!(value["score"], 1.5);
    }

    #[test]
    fn row_json_keeps_non_finite_score_as_text() {
        let value = row_json(4, &Row::new("bob", "-inf"));
        assert_eq!(value["row"], 5);
        assert_eq!(value["score"], "-inf");
    }
}
