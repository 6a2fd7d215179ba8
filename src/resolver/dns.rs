//! Resolving targets through the DNS.
//!
//! The [`DnsBuilder`] creates resolvers for targets of the `dns` scheme.
//! The lookups themselves are done by a [`Lookup`] implementation, by
//! default the [`StubLookup`] which asks the system's recursive resolvers
//! for the A and AAAA records of the host.
//!
//! DNS targets have to leave the authority empty, as in
//! `dns:///example.com:443`. Picking a name server through the authority is
//! not supported.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::target::Target;

use super::registry::BuildResolver;
use super::{BuilderOption, Config, Lookup, Resolver, ResolverTask, Sink};

#[cfg(feature = "resolv")]
pub use self::stub::StubLookup;

//------------ Module Configuration ------------------------------------------

/// The scheme of DNS targets.
pub const SCHEME: &str = "dns";

//------------ DnsBuilder ----------------------------------------------------

/// Creates resolvers for DNS targets.
#[derive(Clone)]
pub struct DnsBuilder {
    /// Performs the lookups of all resolvers created.
    lookup: Arc<dyn Lookup>,

    /// The configuration of all resolvers created.
    config: Config,
}

impl DnsBuilder {
    /// Creates a builder using the system's resolver configuration.
    #[cfg(feature = "resolv")]
    pub fn new() -> Self {
        Self::with_lookup(StubLookup::new())
    }

    /// Creates a builder applying the given options.
    ///
    /// Fails if any of the options has an invalid value.
    #[cfg(feature = "resolv")]
    pub fn with_options(
        options: impl IntoIterator<Item = BuilderOption>,
    ) -> Result<Self, Error> {
        Self::with_lookup_and_options(StubLookup::new(), options)
    }

    /// Creates a builder using the given lookup.
    pub fn with_lookup(lookup: impl Lookup + 'static) -> Self {
        Self::from_parts(Arc::new(lookup), Config::default())
    }

    /// Creates a builder using the given lookup and options.
    pub fn with_lookup_and_options(
        lookup: impl Lookup + 'static,
        options: impl IntoIterator<Item = BuilderOption>,
    ) -> Result<Self, Error> {
        Ok(Self::from_parts(
            Arc::new(lookup),
            Config::from_options(options)?,
        ))
    }

    /// Creates a builder from a shared lookup and a configuration.
    pub fn from_parts(lookup: Arc<dyn Lookup>, config: Config) -> Self {
        Self { lookup, config }
    }

    /// Returns the configuration of the builder.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(feature = "resolv")]
impl Default for DnsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildResolver for DnsBuilder {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn build(
        &self,
        target: &Target,
        sink: Arc<dyn Sink>,
    ) -> Result<(Resolver, ResolverTask), Error> {
        if !target.authority().is_empty() {
            return Err(Error::InvalidTarget(format!(
                "name server '{}' in '{target}' is not supported",
                target.authority()
            )));
        }
        let (host, port) = target.host_port(self.config.default_port())?;
        Ok(ResolverTask::new(
            host,
            port,
            self.config,
            self.lookup.clone(),
            sink,
        ))
    }
}

impl fmt::Debug for DnsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsBuilder")
            .field("config", &self.config)
            .finish()
    }
}

//------------ StubLookup ----------------------------------------------------

#[cfg(feature = "resolv")]
mod stub {
    use std::boxed::Box;
    use std::fmt;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use std::string::ToString;
    use std::sync::Arc;
    use std::vec::Vec;

    use domain::base::Name;
    use domain::resolv::StubResolver;

    use crate::resolver::{AddrSet, Lookup};

    /// Looks up hosts using a stub resolver.
    #[derive(Clone)]
    pub struct StubLookup {
        /// The resolver doing the actual work.
        resolver: Arc<StubResolver>,
    }

    impl StubLookup {
        /// Creates a lookup using the system's resolver configuration.
        pub fn new() -> Self {
            Self::from_resolver(StubResolver::new())
        }

        /// Creates a lookup using the given stub resolver.
        pub fn from_resolver(resolver: StubResolver) -> Self {
            Self {
                resolver: Arc::new(resolver),
            }
        }
    }

    impl fmt::Debug for StubLookup {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("StubLookup")
        }
    }

    impl Default for StubLookup {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Lookup for StubLookup {
        fn lookup<'a>(
            &'a self,
            host: &'a str,
            port: u16,
        ) -> Pin<
            Box<dyn Future<Output = Result<AddrSet, io::Error>> + Send + 'a>,
        > {
            Box::pin(async move {
                let name =
                    Name::<Vec<u8>>::vec_from_str(host).map_err(|err| {
                        io::Error::new(
                            io::ErrorKind::InvalidInput,
                            err.to_string(),
                        )
                    })?;
                let found = self.resolver.lookup_host(&name).await?;
                Ok(found.port_iter(port).collect())
            })
        }
    }
}

//============ Tests =========================================================
