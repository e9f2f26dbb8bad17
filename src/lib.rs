//! `api-client-bench` is a pooled, retrying JSON HTTP client plus a small
//! benchmark of fetch strategies built on it.
//!
//! The client exposes CRUD verbs against a fixed base URL:
//! - [`ApiClient::get`]
//! - [`ApiClient::post`]
//! - [`ApiClient::put`]
//! - [`ApiClient::delete`]
//!
//! The [`bench`] module times direct, pooled and concurrent fetching of a
//! range of resources.

pub mod bench;
mod client;
mod error;
mod options;
mod payload;
pub mod retry;

pub use client::ApiClient;
pub use error::ApiError;
pub use options::ClientOptions;
pub use payload::Payload;

pub type Result<T> = std::result::Result<T, ApiError>;
