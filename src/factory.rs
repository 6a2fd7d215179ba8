//! Creating balanced connections.
//!
//! A [`Factory`] sets up everything needed to spread calls to a target over
//! a number of transport connections: it picks the resolver for the
//! target's scheme from its [`Registry`], opens a [`Pool`] of connections
//! each fed by its own resolver, and wraps the pool into a
//! [`BalancedConnection`] that routes every call through a
//! [`PoolInterceptor`].
//!
//! The transport itself is supplied by the caller as a [`Dial`]
//! implementation. It receives an [`AddrWatch`] with every connection it
//! is asked to open and is expected to follow the addresses published
//! through it.
//!
//! Calls made through a [`BalancedConnection`] wait for the transport to
//! become ready by default. This can be changed through the factory's
//! [`Config`] or for an individual call via its [`CallOptions`].

use std::boxed::Box;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::vec::Vec;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Error;
use crate::interceptor::{CallOptions, Intercept, Invoke, PoolInterceptor};
use crate::pool::{Close, Connect, Pool};
use crate::resolver::{
    AddrWatch, BuildResolver, Registry, Resolver, WatchSink,
};
use crate::target::Target;

//------------ Configuration Constants ---------------------------------------

/// The default number of connections in a pool.
const DEF_POOL_SIZE: usize = 6;

//------------ Dial ----------------------------------------------------------

/// Opens a transport connection to a target.
pub trait Dial: Send + Sync {
    /// The type of an open connection.
    type Connection: Close + Send + Sync + 'static;

    /// Opens a new connection to `target`.
    ///
    /// The addresses of the target are provided through `addrs` and kept
    /// current for as long as the connection holds on to it.
    fn dial<'a>(
        &'a self,
        target: &'a Target,
        addrs: AddrWatch,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Self::Connection, io::Error>>
                + Send
                + 'a,
        >,
    >;
}

//------------ Config --------------------------------------------------------

/// Configuration for a factory.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The number of connections to open per target.
    pool_size: usize,

    /// Whether calls wait for the transport to become ready by default.
    wait_for_ready: bool,
}

impl Config {
    /// Returns the number of connections to open per target.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Sets the number of connections to open per target.
    ///
    /// A size of zero makes opening fail.
    pub fn set_pool_size(&mut self, value: usize) {
        self.pool_size = value
    }

    /// Returns whether calls wait for the transport by default.
    pub fn wait_for_ready(&self) -> bool {
        self.wait_for_ready
    }

    /// Sets whether calls wait for the transport by default.
    pub fn set_wait_for_ready(&mut self, value: bool) {
        self.wait_for_ready = value
    }

    /// Returns the default call options resulting from this config.
    pub fn call_options(&self) -> CallOptions {
        let mut res = CallOptions::new();
        res.set_wait_for_ready(self.wait_for_ready);
        res
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEF_POOL_SIZE,
            wait_for_ready: true,
        }
    }
}

//------------ Factory -------------------------------------------------------

/// Creates balanced connections.
#[derive(Clone, Debug)]
pub struct Factory {
    /// The resolvers available to targets.
    registry: Arc<Registry>,

    /// The configuration.
    config: Config,
}

impl Factory {
    /// Creates a factory resolving targets through the DNS.
    ///
    /// The DNS resolver is registered as the default for targets without
    /// a scheme.
    #[cfg(feature = "resolv")]
    pub fn new(config: Config) -> Self {
        Self::with_registry(Arc::new(Registry::with_dns()), config)
    }

    /// Creates a factory using the given registry.
    pub fn with_registry(registry: Arc<Registry>, config: Config) -> Self {
        Self { registry, config }
    }

    /// Returns the registry of the factory.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the configuration of the factory.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a balanced connection to `target`.
    ///
    /// Fails if the target can't be parsed, if no resolver is registered
    /// for its scheme, or if any of the pool's connections fails to open.
    /// In the latter case, all connections already opened are closed
    /// again.
    pub async fn open<D: Dial>(
        &self,
        target: &str,
        dial: &D,
    ) -> Result<BalancedConnection<D::Connection>, Error> {
        let target = Target::parse(target)?;
        let (target, builder) = self.registry.builder_for(&target)?;
        let connect = ResolvingConnect {
            dial,
            target: &target,
            builder,
            resolvers: Default::default(),
            build_error: Default::default(),
        };

        let pool = match Pool::open(&connect, self.config.pool_size).await {
            Ok(pool) => pool,
            Err(err) => {
                for resolver in connect.resolvers.lock().iter() {
                    resolver.stop();
                }
                return Err(connect.build_error.lock().take().unwrap_or(err));
            }
        };

        debug!(%target, size = pool.len(), "opened balanced connection");
        let resolvers = connect.resolvers.into_inner();
        Ok(BalancedConnection {
            interceptor: PoolInterceptor::new(Arc::new(pool)),
            resolvers: resolvers.into(),
            defaults: self.config.call_options(),
            target: target.clone(),
        })
    }
}

/// Opens a balanced connection with the default configuration.
///
/// Targets are resolved through the DNS unless they name another scheme.
#[cfg(feature = "resolv")]
pub async fn open_balanced<D: Dial>(
    target: &str,
    dial: &D,
) -> Result<BalancedConnection<D::Connection>, Error> {
    Factory::new(Config::default()).open(target, dial).await
}

//------------ ResolvingConnect ----------------------------------------------

/// Connects pool connections, each fed by its own resolver.
struct ResolvingConnect<'a, D> {
    /// The transport.
    dial: &'a D,

    /// The target, always with a scheme.
    target: &'a Target,

    /// Creates the resolvers.
    builder: Arc<dyn BuildResolver>,

    /// The resolvers started so far.
    resolvers: Mutex<Vec<Resolver>>,

    /// The error if building a resolver failed.
    build_error: Mutex<Option<Error>>,
}

impl<'a, D: Dial> Connect for ResolvingConnect<'a, D> {
    type Connection = D::Connection;

    fn connect(
        &self,
        index: usize,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Self::Connection, io::Error>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            let (sink, rx) = WatchSink::channel();
            let (resolver, task) =
                match self.builder.build(self.target, Arc::new(sink)) {
                    Ok(res) => res,
                    Err(err) => {
                        *self.build_error.lock() = Some(err.clone());
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            err,
                        ));
                    }
                };
            tokio::spawn(task.run());
            trace!(index, "started resolver for pool connection");
            self.resolvers.lock().push(resolver.clone());
            self.dial
                .dial(self.target, AddrWatch::new(rx, resolver))
                .await
        })
    }
}

//------------ BalancedConnection --------------------------------------------

/// A logical connection spreading calls over a pool.
pub struct BalancedConnection<Conn> {
    /// Routes calls to the pool.
    interceptor: PoolInterceptor<Conn>,

    /// The resolvers feeding the pool's connections.
    resolvers: Arc<[Resolver]>,

    /// Defaults for options not set on a call.
    defaults: CallOptions,

    /// The target of the connection.
    target: Target,
}

impl<Conn> BalancedConnection<Conn> {
    /// Performs a call over the next connection of the pool.
    ///
    /// Options not set in `options` are taken from the defaults of the
    /// connection. The result of `invoker` is returned unchanged.
    pub async fn call<Req, I>(
        &self,
        method: &str,
        request: Req,
        invoker: &I,
        options: CallOptions,
    ) -> Result<I::Response, I::Error>
    where
        I: Invoke<Conn, Req> + ?Sized,
    {
        let options = options.or(self.defaults);
        self.interceptor
            .intercept(method, request, None, invoker, &options)
            .await
    }

    /// Returns the default call options.
    pub fn default_call_options(&self) -> CallOptions {
        self.defaults
    }

    /// Returns the pool.
    pub fn pool(&self) -> &Arc<Pool<Conn>> {
        self.interceptor.pool()
    }

    /// Returns the interceptor routing calls to the pool.
    pub fn interceptor(&self) -> &PoolInterceptor<Conn> {
        &self.interceptor
    }

    /// Returns the target of the connection.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Asks the resolvers of all connections for an early lookup.
    pub fn resolve_now(&self) {
        for resolver in self.resolvers.iter() {
            resolver.resolve_now()
        }
    }
}

impl<Conn: Close> BalancedConnection<Conn> {
    /// Closes all connections and stops their resolvers.
    pub async fn close(&self) -> Result<(), Error> {
        for resolver in self.resolvers.iter() {
            resolver.stop()
        }
        self.pool().close().await
    }
}

impl<Conn> Clone for BalancedConnection<Conn> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
            resolvers: self.resolvers.clone(),
            defaults: self.defaults,
            target: self.target.clone(),
        }
    }
}

impl<Conn> fmt::Debug for BalancedConnection<Conn> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalancedConnection")
            .field("target", &self.target)
            .field("pool", self.interceptor.pool())
            .field("defaults", &self.defaults)
            .finish()
    }
}

//============ Tests =========================================================
