//! Purpose: Define the Remote Store Client boundary consumed by window models.
//! Exports: `StoreClient`, `Command`, `ApiResult`.
//! Role: Narrow synchronous request/response seam; transports implement `execute`.
//! Invariants: A call either returns the store's reply or a typed `Error`; no partial results.
//! Invariants: Error replies from the store surface as `ErrorKind::Remote` with the server text.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::core::resp::Reply;
use bstr::ByteSlice;
use std::sync::Arc;

pub type ApiResult<T> = Result<T, Error>;

/// The four sorted-set commands a window model issues, each bound to one key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    Count {
        key: &'a [u8],
    },
    Range {
        key: &'a [u8],
        start: i64,
        stop: i64,
    },
    Add {
        key: &'a [u8],
        score: &'a [u8],
        member: &'a [u8],
    },
    Remove {
        key: &'a [u8],
        member: &'a [u8],
    },
}

impl Command<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Count { .. } => "ZCARD",
            Command::Range { .. } => "ZRANGE",
            Command::Add { .. } => "ZADD",
            Command::Remove { .. } => "ZREM",
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Command::Count { key }
            | Command::Range { key, .. }
            | Command::Add { key, .. }
            | Command::Remove { key, .. } => key,
        }
    }

    /// Wire arguments, command name first.
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let name = self.name().as_bytes().to_vec();
        match self {
            Command::Count { key } => vec![name, key.to_vec()],
            Command::Range { key, start, stop } => vec![
                name,
                key.to_vec(),
                start.to_string().into_bytes(),
                stop.to_string().into_bytes(),
                b"WITHSCORES".to_vec(),
            ],
            Command::Add { key, score, member } => {
                vec![name, key.to_vec(), score.to_vec(), member.to_vec()]
            }
            Command::Remove { key, member } => vec![name, key.to_vec(), member.to_vec()],
        }
    }
}

/// Executes store commands against a database index.
///
/// Implementations block until the reply arrives or the transport fails.
pub trait StoreClient {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply>;
}

impl<T: StoreClient + ?Sized> StoreClient for &T {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        (**self).execute(db, command)
    }
}

impl<T: StoreClient + ?Sized> StoreClient for Box<T> {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        (**self).execute(db, command)
    }
}

impl<T: StoreClient + ?Sized> StoreClient for Arc<T> {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        (**self).execute(db, command)
    }
}

pub(crate) fn expect_integer(reply: Reply, command: &Command<'_>) -> ApiResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        other => Err(unexpected_reply(other, command)),
    }
}

/// Flattens a ranged-fetch reply into its raw values; nil reads as empty.
pub(crate) fn expect_flat_values(reply: Reply, command: &Command<'_>) -> ApiResult<Vec<Vec<u8>>> {
    match reply {
        Reply::Nil => Ok(Vec::new()),
        Reply::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Reply::Bulk(bytes) => values.push(bytes),
                    other => return Err(unexpected_reply(other, command)),
                }
            }
            Ok(values)
        }
        other => Err(unexpected_reply(other, command)),
    }
}

fn unexpected_reply(reply: Reply, command: &Command<'_>) -> Error {
    match reply {
        Reply::Error(message) => Error::new(ErrorKind::Remote)
            .with_message(message)
            .with_key(command.key()),
        other => Error::new(ErrorKind::Remote)
            .with_message(format!(
                "unexpected {} reply to {}",
                other.kind_name(),
                command.name()
            ))
            .with_key(command.key()),
    }
}

pub(crate) fn describe(command: &Command<'_>) -> String {
    let args = command.to_args();
    args.iter()
        .map(|arg| arg.as_bstr().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
