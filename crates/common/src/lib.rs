//! Common types shared across the Tollgate crates.
//!
//! Currently this is the [`Hostname`] newtype, the primary key for all
//! per-certificate state.

pub mod hostname;

pub use hostname::{Hostname, HostnameError, MAX_HOSTNAME_LEN, MAX_LABEL_LEN};
