//! `drip-engine` — the rate-limited, crash-resumable drain loop.
//!
//! # Overview
//!
//! One [`engine::Engine`] per instance owns the whole execution state
//! machine: Idle → Draining → Idle. [`admit::AdmissionGate`] is the only
//! entry point that creates work; a durable [`timer::WakeTimer`] plus a
//! one-second watch loop guarantee that an interrupted drain is always
//! re-entered, and [`dispatch`] issues the actual outbound calls strictly
//! one at a time.
//!
//! Resumption needs no cursor: the drain re-queries a job's pending
//! requests from the store, and resolved rows simply no longer appear.

pub mod admit;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod timer;

pub use admit::{Admitted, AdmissionGate, SubmitOptions};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use timer::WakeTimer;
