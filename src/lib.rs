//! hxpolicy - provision HyperFlex Edge policies through a generic REST
//! resource client, gated on an account availability check.

pub mod alert;
pub mod api;
pub mod config;
pub mod context;
pub mod gate;
pub mod policy;
pub mod workflow;
