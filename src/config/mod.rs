//! Configuration Management
//!
//! Turns the operator's declarative configuration plus the process
//! environment into one immutable [`ResolvedConfiguration`].
//!
//! # Module Structure
//!
//! - [`raw`] - Declared configuration tree with tri-state fields
//! - [`env`] - Environment snapshot and text parsing rules
//! - [`aliases`] - Environment variable names per field
//! - [`resolve`] - Precedence merge (environment > declared > default)

pub mod aliases;
pub mod env;
pub mod raw;
pub mod resolve;

pub use env::EnvironmentSnapshot;
pub use raw::{Declared, RawClientOptions, RawConfiguration, RawEntraIdOptions};
pub use resolve::{resolve, ClientOptions, EntraIdOptions, ResolvedConfiguration};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Default location of the declarative configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("m365-provider").join("provider.yaml"))
}

/// Load the declared configuration
///
/// An explicit path must exist. Without one, the default location is used
/// and a missing file means an empty declaration, so operators can rely on
/// environment variables alone.
pub fn load_declared(path: Option<&Path>) -> Result<RawConfiguration, ConfigError> {
    if let Some(path) = path {
        return RawConfiguration::load(path);
    }

    let Some(path) = default_config_path() else {
        return Ok(RawConfiguration::default());
    };

    if !path.exists() {
        tracing::debug!("No configuration file at {:?}, using environment only", path);
        return Ok(RawConfiguration::default());
    }

    RawConfiguration::load(&path)
}
