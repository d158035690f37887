//! Purpose: Library crate behind the `zsetview` CLI: paged local views over remote sorted sets.
//! Exports: `api` (window model, store clients), `core` (cache, codecs, errors), `notice`.
//! Role: Embeddable by UI, export, and CLI callers that need row-indexed access.
//! Invariants: Only rows actually requested are fetched; the cache follows successful commands.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod notice;
