// Core modules: row cache, row codec, wire framing, and error modeling.
pub mod codec;
pub mod error;
pub mod range_cache;
pub mod resp;
