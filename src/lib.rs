//! Fetches a JSON Web Key Set, writes its keys as PEM files and notifies a
//! dependent process when any of them changed.

pub mod cli;
pub mod config;
pub mod job;
pub mod keys;
mod keys_utils;
pub mod pattern;
pub mod reload;
pub mod schedule;
pub mod writer;

pub use keys_utils::KeyError;
