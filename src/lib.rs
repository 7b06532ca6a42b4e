//! nestquery - query layer of a schema-driven hierarchical database
//!
//! Declarative nested queries are compiled into store commands, executed
//! against an external storage engine, and decoded back into the requested
//! shape. Live queries keep that shape current through store-side markers
//! and time-based refresh.
//!
//! # Usage
//!
//! ```ignore
//! use nestquery::client::Client;
//!
//! let client = Client::new(store, schema, config.client);
//! let team = client.get(&json!({ "$id": "te1", "name": true })).await?;
//! let live = client.sub(&json!({ "$id": "te1", "players": { "$list": {} } })).await?;
//! ```

pub mod bridge;
pub mod client;
pub mod compiler;
pub mod config;
pub mod decoder;
pub mod executor;
pub mod observability;
pub mod query;
pub mod schema;
pub mod store;
pub mod subscription;
