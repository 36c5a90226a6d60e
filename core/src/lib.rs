//! # Cinetheque Core
//!
//! Domain model and reconciliation engines for the Cinetheque
//! physical-media exchange platform: members deposit discs, receive a
//! streaming copy, and trade custody of catalogued copies while paying
//! through an external subscription processor.
//!
//! This crate is the ownership & subscription reconciliation core. It
//! keeps three things mutually consistent under duplicated and
//! out-of-order external events:
//!
//! - the physical-copy custody ledger ([`registry`]),
//! - the deposit intake workflow ([`deposit`]),
//! - the externally billed subscription state machine
//!   ([`subscription`], fed by [`ingestion`]).
//!
//! Destructive operations go through [`removal`], which redistributes
//! a departing member's copies ([`redistribution`]) so inventory is
//! never orphaned.
//!
//! The backing relational store sits behind the traits in [`store`];
//! external collaborators (catalog, payment processor, auth directory)
//! behind the traits in [`external`]. The `test-utils` feature ships an
//! in-memory store and mock collaborators in [`memory`].

pub mod cache;
pub mod clock;
pub mod deposit;
pub mod error;
pub mod external;
pub mod ingestion;
pub mod registry;
pub mod redistribution;
pub mod removal;
pub mod retry;
pub mod store;
pub mod subscription;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod memory;

pub use error::{CoreError, Result};
