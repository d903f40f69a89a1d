//! `drip-report` — read-only status aggregation for polling clients.
//!
//! The reporter owns its own store connection and never mutates anything,
//! so polling stays safe and cheap while the drain loop is running.

pub mod report;

pub use report::{JobReport, StatusReporter};
