// Row codec: flat ranged-fetch replies <-> typed (member, score) rows.
use crate::core::error::{Error, ErrorKind};
use bstr::{BString, ByteSlice};
use serde_json::{Map, Value};

/// One element of a sorted set as seen at some row position.
///
/// The score is kept as the text the store sent; it is parsed on read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub member: BString,
    pub score: BString,
}

impl Row {
    pub fn new(member: impl Into<BString>, score: impl Into<BString>) -> Self {
        Self {
            member: member.into(),
            score: score.into(),
        }
    }

    pub fn score_value(&self) -> Result<f64, Error> {
        parse_score(&self.score)
    }
}

/// Caller-supplied field map for row mutations (`value` and `score`).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowInput {
    pub value: Option<BString>,
    pub score: Option<String>,
}

impl RowInput {
    pub fn new(value: impl Into<BString>, score: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            score: Some(score.into()),
        }
    }

    /// Reads `value` and `score` from a JSON field map.
    ///
    /// Numeric scores are accepted and rendered with their JSON text.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let value = match fields.get("value") {
            Some(Value::String(text)) => Some(BString::from(text.as_str())),
            Some(Value::Number(number)) => Some(BString::from(number.to_string())),
            _ => None,
        };
        let score = match fields.get("score") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        };
        Self { value, score }
    }

    /// Checks the row rule: both fields present and non-empty, score numeric.
    pub fn validate(&self) -> Result<Row, Error> {
        let value = match &self.value {
            Some(value) if !value.is_empty() => value.clone(),
            _ => return Err(invalid_row("row value is missing or empty")),
        };
        let score = match &self.score {
            Some(score) if !score.trim().is_empty() => score.trim().to_string(),
            _ => return Err(invalid_row("row score is missing or empty")),
        };
        if parse_score(score.as_bytes()).is_err() {
            return Err(invalid_row("row score is not a number")
                .with_hint("Use a decimal score such as 1.5, or inf/-inf."));
        }
        Ok(Row::new(value, score))
    }
}

/// Pairs a flat `member, score, member, score, ...` reply into rows.
///
/// An odd-length reply is a truncated response and yields no rows at all.
pub fn decode_fetch_response(values: Vec<Vec<u8>>, range_start: u64) -> Result<Vec<Row>, Error> {
    if values.len() % 2 != 0 {
        return Err(Error::new(ErrorKind::PartialData)
            .with_message(format!(
                "ranged fetch returned {} values; expected member/score pairs",
                values.len()
            ))
            .with_index(range_start));
    }

    let mut rows = Vec::with_capacity(values.len() / 2);
    let mut values = values.into_iter();
    while let (Some(member), Some(score)) = (values.next(), values.next()) {
        rows.push(Row::new(member, score));
    }
    Ok(rows)
}

/// Lenient text-to-number conversion for scores (surrounding whitespace, `inf`, `-inf`).
pub fn parse_score(text: &[u8]) -> Result<f64, Error> {
    let malformed = || {
        Error::new(ErrorKind::MalformedRow)
            .with_message(format!("score {:?} is not a number", text.as_bstr()))
    };
    let text = text.to_str().map_err(|_| malformed())?.trim();
    let value: f64 = text.parse().map_err(|_| malformed())?;
    if value.is_nan() {
        return Err(malformed());
    }
    Ok(value)
}

fn invalid_row(message: &str) -> Error {
    Error::new(ErrorKind::InvalidRow).with_message(message)
}
