//! Shared types for the pgward PostgreSQL gateway
//!
//! This crate defines everything both sides of the gateway agree on:
//! - The error taxonomy surfaced to callers and log records
//! - The static tool/action table with per-action access markers
//! - Typed parameter records for every action
//! - Response payloads and the session-echo envelope
//! - The identifier sanitizer used wherever a name is interpolated into SQL
//!
//! It deliberately has no database dependency; the executor crates build on
//! top of it.

pub mod error;
pub mod ident;
pub mod request;
pub mod response;

pub use error::{GatewayError, GatewayResult};
pub use ident::sanitize_identifier;
pub use request::{AccessMode, ToolAction};
pub use response::{ActiveSession, Envelope, FieldDescription, QueryOutcome};
