//! Domain models shared by the session core and the HTTP client.

pub mod auth;
