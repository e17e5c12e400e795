//! JSON-RPC surface: protocol types, parameter decoding, method dispatch,
//! and the HTTP server.
//!
//! ## Contents
//! - [`protocol`] — request/response/error envelopes, standard codes
//! - [`ApiV1`] — method handlers over the controller
//! - [`router`], [`serve`] — axum wiring for `POST /rpc`

pub mod protocol;

mod api;
mod params;
mod server;

pub use api::ApiV1;
pub use server::{router, serve};
