//! Picking a resolver by scheme.
//!
//! A [`Registry`] maps the scheme of a target, such as `dns` in
//! `dns:///example.com`, to the [`BuildResolver`] creating resolvers for
//! it. One scheme can be made the default for targets without a scheme.
//!
//! The registry is an ordinary value. Whoever creates connections owns one
//! and passes it on; there is no process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::string::{String, ToString};
use std::sync::Arc;
use std::vec::Vec;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Error;
use crate::target::Target;

use super::{Resolver, ResolverTask, Sink};

//------------ BuildResolver -------------------------------------------------

/// Creates resolvers for the targets of one scheme.
pub trait BuildResolver: Send + Sync {
    /// Returns the scheme this builder is responsible for.
    fn scheme(&self) -> &str;

    /// Creates a resolver for `target` feeding `sink`.
    ///
    /// The returned task needs to be spawned for resolution to happen.
    fn build(
        &self,
        target: &Target,
        sink: Arc<dyn Sink>,
    ) -> Result<(Resolver, ResolverTask), Error>;
}

//------------ Registry ------------------------------------------------------

/// A set of resolver builders keyed by scheme.
#[derive(Default)]
pub struct Registry {
    /// The content of the registry.
    inner: RwLock<Inner>,
}

/// The content of a [`Registry`].
#[derive(Default)]
struct Inner {
    /// The builders keyed by their lower-case scheme.
    builders: HashMap<String, Arc<dyn BuildResolver>>,

    /// The scheme used for targets without one.
    default_scheme: Option<String>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a registry with the DNS resolver as the default.
    #[cfg(feature = "resolv")]
    pub fn with_dns() -> Self {
        let mut inner = Inner::default();
        inner.builders.insert(
            super::dns::SCHEME.into(),
            Arc::new(super::dns::DnsBuilder::new()),
        );
        inner.default_scheme = Some(super::dns::SCHEME.into());
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Registers a builder for its scheme.
    ///
    /// Each scheme can be registered only once. Returns `false` and leaves
    /// the registry unchanged if the scheme is already present.
    pub fn register(&self, builder: Arc<dyn BuildResolver>) -> bool {
        let scheme = builder.scheme().to_ascii_lowercase();
        let mut inner = self.inner.write();
        if inner.builders.contains_key(&scheme) {
            debug!(scheme, "resolver scheme already registered");
            return false;
        }
        debug!(scheme, "registered resolver scheme");
        inner.builders.insert(scheme, builder);
        true
    }

    /// Makes `scheme` the scheme for targets without one.
    ///
    /// The scheme has to be registered already.
    pub fn set_default_scheme(&self, scheme: &str) -> Result<(), Error> {
        let scheme = scheme.to_ascii_lowercase();
        let mut inner = self.inner.write();
        if !inner.builders.contains_key(&scheme) {
            return Err(Error::UnknownScheme(scheme));
        }
        inner.default_scheme = Some(scheme);
        Ok(())
    }

    /// Returns the scheme for targets without one, if set.
    pub fn default_scheme(&self) -> Option<String> {
        self.inner.read().default_scheme.clone()
    }

    /// Returns the builder registered for `scheme`.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn BuildResolver>> {
        self.inner
            .read()
            .builders
            .get(&scheme.to_ascii_lowercase())
            .cloned()
    }

    /// Returns the builder for a target.
    ///
    /// Targets without a scheme get the default scheme. The returned target
    /// always has a scheme.
    pub fn builder_for(
        &self,
        target: &Target,
    ) -> Result<(Target, Arc<dyn BuildResolver>), Error> {
        let target = match target.scheme() {
            Some(_) => target.clone(),
            None => match self.default_scheme() {
                Some(scheme) => target.with_default_scheme(&scheme),
                None => {
                    return Err(Error::NoDefaultScheme(target.to_string()));
                }
            },
        };
        let scheme = target.scheme().unwrap_or_default();
        match self.get(scheme) {
            Some(builder) => Ok((target, builder)),
            None => Err(Error::UnknownScheme(scheme.into())),
        }
    }

    /// Returns the registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut res: Vec<_> =
            self.inner.read().builders.keys().cloned().collect();
        res.sort();
        res
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .field("default_scheme", &self.default_scheme())
            .finish()
    }
}

//============ Tests =========================================================
