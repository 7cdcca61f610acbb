//! Connection targets: options and URI construction.
//!
//! [`ConnectOptions`] separates credentials, port and scheme from the remaining driver
//! options. [`ConnectUri::build`] assembles `scheme://[user:pass@]host:port/database` from
//! them; only [`ConnectOptions::driver_options`] is forwarded to the driver alongside it.

use bson::{Bson, Document};
use std::fmt::{self, Display};
use url::Url;

use crate::error::{DocumentStoreError, DocumentStoreResult};

pub const DEFAULT_SCHEME: &str = "mongodb";
pub const DEFAULT_PORT: u16 = 27017;

const USER_KEYS: [&str; 2] = ["user", "username"];
const PASS_KEYS: [&str; 2] = ["pass", "password"];

/// Options accepted when opening a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub scheme: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub port: Option<u16>,
    /// Everything else, forwarded to the driver verbatim.
    pub extra: Document,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits an untyped options mapping into credentials, port, scheme and driver options.
    ///
    /// Recognized keys are `user`/`username`, `pass`/`password`, `port` and `scheme`; they
    /// are removed from the forwarded options.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] when a recognized key has the wrong type.
    pub fn from_document(mut options: Document) -> DocumentStoreResult<Self> {
        let user = take_string(&mut options, &USER_KEYS)?;
        let pass = take_string(&mut options, &PASS_KEYS)?;
        let scheme = take_string(&mut options, &["scheme"])?;
        let port = match options.remove("port") {
            None | Some(Bson::Null) => None,
            Some(value) => Some(port_from_bson(&value)?),
        };

        Ok(Self { scheme, user, pass, port, extra: options })
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn pass(mut self, pass: impl Into<String>) -> Self {
        self.pass = Some(pass.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The options forwarded to the driver: everything but credentials, port and scheme.
    pub fn driver_options(&self) -> &Document {
        &self.extra
    }
}

fn take_string(options: &mut Document, keys: &[&str]) -> DocumentStoreResult<Option<String>> {
    let mut found = None;

    for key in keys {
        match options.remove(*key) {
            None | Some(Bson::Null) => {}
            Some(Bson::String(value)) => found = found.or(Some(value)),
            Some(other) => {
                return Err(DocumentStoreError::InvalidOptions(format!(
                    "option `{key}` must be a string, got {:?}",
                    other.element_type()
                )));
            }
        }
    }

    Ok(found)
}

fn port_from_bson(value: &Bson) -> DocumentStoreResult<u16> {
    let port = match value {
        Bson::Int32(port) => i64::from(*port),
        Bson::Int64(port) => *port,
        Bson::String(port) => port.parse::<i64>().map_err(|_| {
            DocumentStoreError::InvalidOptions(format!("port `{port}` is not a number"))
        })?,
        other => {
            return Err(DocumentStoreError::InvalidOptions(format!(
                "port must be an integer, got {:?}",
                other.element_type()
            )));
        }
    };

    u16::try_from(port)
        .map_err(|_| DocumentStoreError::InvalidOptions(format!("port {port} is out of range")))
}

/// A connection URI of the form `scheme://[user:pass@]host:port/database`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUri {
    url: Url,
    database: String,
}

impl ConnectUri {
    /// Builds the URI for `host` and `database` from connection options.
    ///
    /// A port given in the options wins over one embedded in `host`; without either,
    /// [`DEFAULT_PORT`] is used. Credentials are percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for an empty host or database, or when
    /// the pieces do not form a valid URI.
    pub fn build(host: &str, database: &str, options: &ConnectOptions) -> DocumentStoreResult<Self> {
        if host.trim().is_empty() {
            return Err(DocumentStoreError::InvalidOptions("host must not be empty".to_string()));
        }
        if database.trim().is_empty() {
            return Err(DocumentStoreError::InvalidOptions(
                "database name must not be empty".to_string(),
            ));
        }

        let scheme = options.scheme.as_deref().unwrap_or(DEFAULT_SCHEME);
        let invalid = |err: url::ParseError| {
            DocumentStoreError::InvalidOptions(format!("invalid connection target: {err}"))
        };

        let mut url = Url::parse(&format!("{scheme}://{host}/{database}")).map_err(invalid)?;

        match (options.port, url.port()) {
            (Some(port), _) => set_port(&mut url, port)?,
            (None, None) => set_port(&mut url, DEFAULT_PORT)?,
            (None, Some(_)) => {}
        }

        if let Some(user) = &options.user {
            url.set_username(user)
                .map_err(|_| DocumentStoreError::InvalidOptions("cannot set username".to_string()))?;

            if let Some(pass) = &options.pass {
                url.set_password(Some(pass)).map_err(|_| {
                    DocumentStoreError::InvalidOptions("cannot set password".to_string())
                })?;
            }
        }

        Ok(Self { url, database: database.to_string() })
    }

    /// Parses an existing URI string.
    pub fn parse(uri: &str) -> DocumentStoreResult<Self> {
        let url = Url::parse(uri)
            .map_err(|err| DocumentStoreError::InvalidOptions(format!("invalid uri: {err}")))?;
        let database = url
            .path()
            .trim_start_matches('/')
            .to_string();

        Ok(Self { url, database })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn username(&self) -> &str {
        self.url.username()
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    /// The URI with its password masked, safe for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }
}

fn set_port(url: &mut Url, port: u16) -> DocumentStoreResult<()> {
    url.set_port(Some(port))
        .map_err(|_| DocumentStoreError::InvalidOptions(format!("cannot set port {port}")))
}

impl Display for ConnectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
