//! Client facade
//!
//! `Client::get` reads a query once; `Client::sub` returns a `LiveQuery`.

mod client;
mod errors;

pub use client::Client;
pub use errors::{ClientError, ClientResult};
