//! Vault server address.

use crate::error::{VaultError, VaultResult};
use std::fmt;
use url::Url;

/// API prefix used when the address has no path.
pub const API_VERSION: &str = "v1";

/// Scheme, host, port and API path of a Vault server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEndpoint {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl VaultEndpoint {
    /// HTTPS endpoint for `host:port`.
    #[must_use]
    pub fn create(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "https".to_string(),
            host: host.into(),
            port,
            path: API_VERSION.to_string(),
        }
    }

    /// Parse an address such as `https://vault.vault.svc:8200`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unparsable addresses, schemes other than
    /// http/https, or addresses without a host.
    pub fn from_url(address: &str) -> VaultResult<Self> {
        let url = Url::parse(address)
            .map_err(|e| VaultError::InvalidConfig(format!("Vault address {address}: {e}")))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(VaultError::InvalidConfig(format!(
                "Vault address {address}: unsupported scheme {scheme}"
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| VaultError::InvalidConfig(format!("Vault address {address}: no host")))?;
        let port = url.port_or_known_default().unwrap_or(8200);
        let path = url.path().trim_matches('/');

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: if path.is_empty() {
                API_VERSION.to_string()
            } else {
                path.to_string()
            },
        })
    }

    /// Scheme (`http` or `https`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// API path prefix.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute URL for an API `path` such as `auth/token/lookup-self`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the resulting URL does not parse.
    pub fn url_for(&self, path: &str) -> VaultResult<Url> {
        let raw = format!("{self}/{}", path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| VaultError::InvalidConfig(format!("{raw}: {e}")))
    }
}

impl fmt::Display for VaultEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.scheme, self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_from_host_and_port() {
        let endpoint = VaultEndpoint::create("host", 1234);
        assert_eq!(endpoint.scheme(), "https");
        assert_eq!(endpoint.host(), "host");
        assert_eq!(endpoint.port(), 1234);
        assert_eq!(endpoint.path(), API_VERSION);
    }

    #[test]
    fn test_from_url_defaults_port_and_path() {
        let endpoint = VaultEndpoint::from_url("http://127.0.0.1").unwrap();
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.port(), 80);
        assert_eq!(endpoint.path(), API_VERSION);

        let endpoint = VaultEndpoint::from_url("http://127.0.0.1:443/").unwrap();
        assert_eq!(endpoint.port(), 443);
    }

    #[test]
    fn test_url_for_with_custom_path() {
        let endpoint = VaultEndpoint::from_url("http://127.0.0.1/context").unwrap();
        assert_eq!(endpoint.path(), "context");
        assert_eq!(
            endpoint.url_for("foo").unwrap().as_str(),
            "http://127.0.0.1/context/foo"
        );
        assert_eq!(
            endpoint.url_for("/secret/data/app?version=2").unwrap().as_str(),
            "http://127.0.0.1/context/secret/data/app?version=2"
        );
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        assert!(matches!(
            VaultEndpoint::from_url("ftp://vault:21"),
            Err(VaultError::InvalidConfig(_))
        ));
        assert!(VaultEndpoint::from_url("not a url").is_err());
    }
}
