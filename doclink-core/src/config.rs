//! Declarative connection configuration.
//!
//! ```yaml
//! connections:
//!   analytics:
//!     host: localhost
//!     database: metrics
//!   orders:
//!     host: db.internal
//!     database: shop
//!     port: 27018
//!     user: app
//!     pass: secret
//!     options:
//!       appName: orders-api
//! ```

use bson::{Bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    uri::ConnectOptions,
};

/// Settings for one named connection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConnectionSettings {
    pub host: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, alias = "username", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, alias = "password", skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Extra driver options forwarded verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Converts these settings into [`ConnectOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] when an extra option cannot be
    /// represented as BSON.
    pub fn connect_options(&self) -> DocumentStoreResult<ConnectOptions> {
        let mut options = ConnectOptions {
            scheme: self.scheme.clone(),
            user: self.user.clone(),
            pass: self.pass.clone(),
            port: self.port,
            ..Default::default()
        };

        for (key, value) in &self.options {
            let value: Bson = serialize_to_bson(value)?;
            options.extra.insert(key.clone(), value);
        }

        Ok(options)
    }
}

/// A set of named connections, typically loaded from a YAML file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionSettings>,
}

impl RegistryConfig {
    pub fn from_yaml_str(yaml: &str) -> DocumentStoreResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Config`] when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> DocumentStoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            DocumentStoreError::Config(format!("cannot read {}: {err}", path.display()))
        })?;

        Self::from_yaml_str(&text)
    }
}
