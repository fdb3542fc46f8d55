//! Crate-level errors.
//!
//! Most failure handling in this crate is deliberately not error-shaped:
//! unparseable feed lines degrade to `Event::Unknown`, a send on a closed
//! transport returns `false`, and failed REST one-shots come back as
//! `false`/`None` from the request API. `RackError` covers the remainder -
//! construction and configuration problems that genuinely prevent a rack
//! from existing.

use thiserror::Error;

/// Errors surfaced while building or tearing down a rack.
#[derive(Debug, Error)]
pub enum RackError {
    #[error(transparent)]
    Rest(#[from] crate::rest::RestError),

    #[error(transparent)]
    Config(#[from] stompconf::ConfigError),
}
