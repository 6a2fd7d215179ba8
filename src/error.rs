//! Error type for pools, resolvers, and the factory.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;

/// Error type for pools, resolvers, and the factory.
///
/// Errors returned by an [`Invoke`][crate::interceptor::Invoke]
/// implementation never end up in here. They are handed back to the caller
/// unchanged.
#[derive(Clone, Debug)]
pub enum Error {
    /// Opening the connection with the given index failed.
    ///
    /// Every connection opened before or alongside it has been closed
    /// again.
    Connect {
        /// Position of the failed connection in the pool.
        index: usize,

        /// The error reported by the transport.
        source: Arc<io::Error>,
    },

    /// A configuration value was rejected.
    Config(&'static str),

    /// A single name lookup failed.
    ///
    /// The resolver keeps polling after this error.
    Resolve(Arc<io::Error>),

    /// Closing one or more connections failed.
    ///
    /// Contains the pool index and error of each failed connection.
    Close(Vec<(usize, Arc<io::Error>)>),

    /// The target string could not be parsed.
    InvalidTarget(String),

    /// No resolver is registered for the scheme of a target.
    UnknownScheme(String),

    /// The target has no scheme and no default scheme is set.
    ///
    /// Contains the target.
    NoDefaultScheme(String),

    /// The resolver feeding an address watch has gone away.
    ResolverClosed,

    /// No addresses are currently known for a target.
    NoAddresses,
}

impl Error {
    /// Returns whether this error is the non-fatal result of one lookup.
    pub fn is_resolve(&self) -> bool {
        matches!(self, Error::Resolve(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Connect { index, source } => {
                write!(f, "failed to open connection {index}: {source}")
            }
            Error::Config(msg) => write!(f, "bad config value: {msg}"),
            Error::Resolve(err) => write!(f, "name lookup failed: {err}"),
            Error::Close(failures) => {
                write!(f, "failed to close connection")?;
                if failures.len() != 1 {
                    write!(f, "s")?;
                }
                for (pos, (index, err)) in failures.iter().enumerate() {
                    let sep = if pos == 0 { " " } else { ", " };
                    write!(f, "{sep}{index} ({err})")?;
                }
                Ok(())
            }
            Error::InvalidTarget(msg) => write!(f, "invalid target: {msg}"),
            Error::UnknownScheme(scheme) => {
                write!(f, "no resolver registered for scheme '{scheme}'")
            }
            Error::NoDefaultScheme(target) => write!(
                f,
                "target '{target}' has no scheme and no default scheme is set"
            ),
            Error::ResolverClosed => write!(f, "resolver closed"),
            Error::NoAddresses => write!(f, "no addresses available"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connect { source, .. } => Some(source),
            Error::Config(_) => None,
            Error::Resolve(err) => Some(err),
            Error::Close(failures) => failures
                .first()
                .map(|(_, err)| err.as_ref() as &(dyn error::Error + 'static)),
            Error::InvalidTarget(_) => None,
            Error::UnknownScheme(_) => None,
            Error::NoDefaultScheme(_) => None,
            Error::ResolverClosed => None,
            Error::NoAddresses => None,
        }
    }
}

//============ Tests =========================================================
