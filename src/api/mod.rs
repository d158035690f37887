//! Purpose: Define the public Rust API for windowed sorted-set views.
//! Exports: The window model, store clients, field/outcome types, and errors.
//! Role: Stable surface for CLI and embedding callers; hides core module paths.
//! Invariants: Models talk to stores only through `StoreClient`.
//! Invariants: Every fallible operation returns `ApiResult` with a typed `ErrorKind`.

mod memory;
mod model;
pub mod notify;
mod remote;
mod store;

pub use crate::core::codec::{Row, RowInput};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::resp::Reply;
#[doc(hidden)]
pub use memory::MemoryStore;
pub use model::{
    AddOutcome, DEFAULT_PAGE_SIZE, Field, FieldValue, KeyState, ModelOptions,
    SortedSetWindowModel, UpdateOutcome,
};
pub use notify::ModelEvent;
pub use remote::{ConnectionConfig, DEFAULT_PORT, RemoteStore};
pub use store::{ApiResult, Command, StoreClient};
