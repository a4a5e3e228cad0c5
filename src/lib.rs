//! Daybook - event-sourcing substrate
//!
//! A single-process event-sourcing core: an append-only NDJSON event log,
//! catch-up subscriptions that replay history and then follow live appends,
//! and versioned read-model stores with throttled snapshot persistence.
//!
//! The log is the system of record. Read models fold events into state and
//! record, per store, the index of the last event they applied; on restart
//! they replay the log and skip what their persisted version already covers.

pub mod config;
pub mod log;
pub mod storage;
pub mod store;
pub mod subscription;
pub mod utils;
