//! Result assembler
//!
//! Flat store rows → the nested shape the query asked for. Each command
//! reply is decoded on its own and merged into the result by target path.

mod decoder;
mod errors;
mod merge;
mod values;

pub use decoder::{Decoded, ResultDecoder};
pub use errors::{DecodeError, DecodeResult};
pub use merge::{deep_merge, get_at, merge_at};
pub use values::decode_value;
