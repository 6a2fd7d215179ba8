//! Parsing of target strings.
//!
//! A target names the logical endpoint a caller wants to talk to. It has
//! the form `<scheme>://<authority>/<endpoint>`, e.g. `dns:///example.com`
//! or `dns://8.8.8.8/example.com:50051`, or is a bare endpoint such as
//! `example.com:443`. The scheme picks the resolver used for the target,
//! the endpoint is the host name or address plus an optional port.

use std::fmt;
use std::net::IpAddr;
use std::string::{String, ToString};

use crate::error::Error;

//------------ Module Configuration ------------------------------------------

/// The port used when the endpoint of a target does not name one.
pub const DEFAULT_PORT: u16 = 443;

//------------ Target --------------------------------------------------------

/// A parsed target string.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Target {
    /// The scheme, if the target had one.
    scheme: Option<String>,

    /// The authority. Empty for `scheme:///endpoint`.
    authority: String,

    /// The endpoint.
    endpoint: String,
}

impl Target {
    /// Parses a target string.
    ///
    /// Strings without `://` are taken as a bare endpoint without scheme.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let Some((scheme, rest)) = s.split_once("://") else {
            return Self::from_endpoint(s);
        };
        if scheme.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "empty scheme in '{s}'"
            )));
        }
        let Some((authority, endpoint)) = rest.split_once('/') else {
            return Err(Error::InvalidTarget(format!(
                "missing '/' before endpoint in '{s}'"
            )));
        };
        if endpoint.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "empty endpoint in '{s}'"
            )));
        }
        Ok(Target {
            scheme: Some(scheme.to_ascii_lowercase()),
            authority: authority.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Creates a target from an endpoint without scheme.
    fn from_endpoint(endpoint: &str) -> Result<Self, Error> {
        if endpoint.is_empty() {
            return Err(Error::InvalidTarget("empty target".into()));
        }
        Ok(Target {
            scheme: None,
            authority: String::new(),
            endpoint: endpoint.into(),
        })
    }

    /// Returns a copy of the target using the given scheme if it has none.
    pub fn with_default_scheme(&self, scheme: &str) -> Self {
        let mut res = self.clone();
        if res.scheme.is_none() {
            res.scheme = Some(scheme.to_ascii_lowercase());
        }
        res
    }

    /// Returns the scheme of the target.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Returns the authority of the target.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Returns the endpoint of the target.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Splits the endpoint into host and port.
    ///
    /// If the endpoint does not contain a port, `default_port` is used.
    /// IPv6 addresses need to be enclosed in brackets if a port is given.
    pub fn host_port(
        &self,
        default_port: u16,
    ) -> Result<(String, u16), Error> {
        let endpoint = self.endpoint.as_str();

        // A bare IP address, including IPv6 without brackets.
        if let Ok(addr) = endpoint.parse::<IpAddr>() {
            return Ok((addr.to_string(), default_port));
        }

        let (host, port) = if let Some(rest) = endpoint.strip_prefix('[') {
            let Some((host, rest)) = rest.split_once(']') else {
                return Err(Error::InvalidTarget(format!(
                    "missing ']' in '{endpoint}'"
                )));
            };
            if host.parse::<IpAddr>().is_err() {
                return Err(Error::InvalidTarget(format!(
                    "'{host}' is not an IPv6 address"
                )));
            }
            match rest {
                "" => (host, None),
                _ => match rest.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(Error::InvalidTarget(format!(
                            "unexpected '{rest}' after address"
                        )))
                    }
                },
            }
        } else {
            match endpoint.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (endpoint, None),
            }
        };

        if host.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "missing host in '{endpoint}'"
            )));
        }
        let port = match port {
            None => default_port,
            Some("") => {
                return Err(Error::InvalidTarget(format!(
                    "missing port after ':' in '{endpoint}'"
                )))
            }
            Some(port) => port.parse().map_err(|_| {
                Error::InvalidTarget(format!("bad port '{port}'"))
            })?,
        };
        Ok((host.into(), port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Some(ref scheme) => {
                write!(f, "{}://{}/{}", scheme, self.authority, self.endpoint)
            }
            None => f.write_str(&self.endpoint),
        }
    }
}

//============ Tests =========================================================
