//! Configuration resolution and resilient transport for the Microsoft 365
//! Graph API.
//!
//! Declarative configuration plus environment overrides go in, a
//! [`ClientBundle`] comes out: endpoints for the selected national cloud, an
//! Entra ID credential, and an HTTP transport with its middleware pipeline.
//!
//! # Module Structure
//!
//! - [`config`] - Declared and resolved configuration
//! - [`cloud`] - National cloud endpoint table
//! - [`auth`] - Credential strategy selection and token acquisition
//! - [`http`] - Retry policy, middleware stages and transport factory
//! - [`client`] - The assembled client bundle

pub mod auth;
pub mod client;
pub mod cloud;
pub mod config;
pub mod error;
pub mod http;

pub use auth::{AuthMethod, Credential};
pub use client::{assemble, build_client_bundle, bundle_from_resolved, ClientBundle};
pub use cloud::{ApiVersion, CloudEndpoints};
pub use config::{EnvironmentSnapshot, RawConfiguration, ResolvedConfiguration};
pub use error::{ConfigError, CredentialError, Error, Result, TransportError};
