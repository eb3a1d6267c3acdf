//! Treatment tracker
//!
//! Patients follow a treatment tree: nodes are treatment steps, edges carry
//! the rule that unlocks a child once its parent is unlocked. The unlock
//! engine keeps each patient's unlocked set closed under `always` edges and
//! applies symptom reports and explicit unlocks on top of it.
//!
//! ## Layers
//!
//! - **engine**: unlock rules, adjacency graph and propagation over a store trait
//! - **db**: SQLite storage (rusqlite) for users, nodes, edges, symptoms and unlocks
//! - **services**: business operations used by the HTTP handlers
//! - **routes** / **server**: JSON API over hyper with cookie sessions

pub mod auth;
pub mod categories;
pub mod config;
pub mod db;
pub mod engine;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use engine::{UnlockAuthority, UnlockEngine, UnlockStore};
pub use server::{run, serve, AppState};
pub use types::{Result, TrackerError};
