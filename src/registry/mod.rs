//! Support for reading image metadata from a registry server
//!
//! Only authentication and manifest retrieval live here. Layers are listed
//! by digest in the [Manifest] but never downloaded.
//!
//! [Manifest]: crate::manifest::Manifest

mod auth;
mod client;

pub use client::*;
