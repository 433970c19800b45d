//! # investpro_api_client
//!
//! HTTP side of the InvestPro session: one [`ApiClient`] per scope that
//! injects the stored bearer token, refreshes it once on 401 when configured
//! and otherwise publishes an invalidation on the shared bus. [`HttpAuthBackend`]
//! builds the login/profile/logout calls on top of two such clients.

pub mod backend;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;

pub use backend::HttpAuthBackend;
pub use client::ApiClient;
pub use config::ClientConfig;
pub use envelope::Envelope;
pub use error::ApiError;
