//! rentavm core library: drift detection and dataset upkeep for scraped
//! rental listings.
//!
//! A daily run hands a batch of scraped listings to the [`pipeline`], which
//! normalizes them, checks them for drift against the historical summary
//! ([`verifier`]) and merges them into the master and snapshot tables
//! ([`cleaner`]). Storage goes through the traits in [`store`], backed by
//! SQLite. With the `python` feature the crate also builds as a Python
//! extension module (`rentavm_core`).

pub mod cleaner;
pub mod config;
pub mod errors;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod verifier;

#[cfg(feature = "python")]
mod python;
