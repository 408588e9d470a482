//! # perp-core
//!
//! Core crate for the perpetual-futures execution system, providing:
//!
//! - **Types** (`types`): enums, order/position/account structs, symbol filters, market data
//! - **Configuration** (`config`): JSON config loading with `${VAR}` substitution
//! - **Error types** (`error`): the typed `PerpError` taxonomy via thiserror
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{ErrorKind, PerpError, Result};
// Re-export types at crate root for convenience.
pub use types::*;
