//! HTTP surface for the Cinetheque exchange platform.
//!
//! Thin imperative shell over `cinetheque-core`: handlers parse and
//! authorize requests, call one engine operation, and map the result
//! (or its domain error) onto an HTTP response. All invariant-bearing
//! logic lives in the core; nothing here mutates state directly.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod providers;
pub mod router;
pub mod signature;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
