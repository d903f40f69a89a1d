//! `drip-gateway` — HTTP front for the drip engine.
//!
//! Two client-facing routes: `POST /jobs` admits a batch, `GET /jobs/{id}`
//! reports its status. Authentication and tenant routing happen upstream;
//! the gateway only consumes the stable routing token the front door sets
//! in `X-Drip-Instance` and maps it to an isolated engine instance.

pub mod app;
pub mod http;
pub mod instances;
