//! Management API interaction module
//!
//! This module provides the generic resource-access layer used by the rest
//! of the crate: authentication, the HTTP transport and the verb-generic
//! resource client.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer-token credentials with caching
//! - [`client`] - Resource client (get/create/replace/patch/delete over any path)
//! - [`http`] - HTTP transport and log sanitizing
//! - [`types`] - `ResourcePath`, `ObjectId` and `Outcome`
//!
//! # Example
//!
//! ```ignore
//! use hxpolicy::api::{Credentials, HttpClient, ResourceClient, ResourcePath};
//!
//! async fn example(http: HttpClient) -> anyhow::Result<()> {
//!     let client = ResourceClient::new(
//!         "https://intersight.com/api/v1",
//!         Credentials::from_token("token"),
//!         http,
//!     )?;
//!     let accounts = client.get_collection(&ResourcePath::new("iam/Accounts")).await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod types;

pub use auth::{Credentials, FileToken, StaticToken, TokenProvider};
pub use client::ResourceClient;
pub use http::HttpClient;
pub use types::{ObjectId, Outcome, ResourcePath};
