//! `drip-core` — shared foundation for the drip workspace.
//!
//! Holds the pieces every other crate needs: the [`config::DripConfig`]
//! loader (drip.toml + `DRIP_*` env overrides), the top-level error type,
//! and the [`instance::InstanceKey`] addressing scheme that routes each
//! tenant to its own separately-persisted engine state.

pub mod config;
pub mod error;
pub mod instance;

pub use config::DripConfig;
pub use error::{DripError, Result};
pub use instance::InstanceKey;
