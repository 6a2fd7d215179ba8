//! Routing calls through a pool.
//!
//! An interceptor is a hook that sees every outgoing call before it is
//! handed to the transport. The [`PoolInterceptor`] uses this to send each
//! call over the next connection of a [`Pool`] instead of the connection
//! the caller supplied. It neither retries nor looks at the request, and
//! whatever the invocation returns goes back to the caller as is.

use std::boxed::Box;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::pool::Pool;

//------------ CallOptions ---------------------------------------------------

/// Options scoped to a single call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallOptions {
    /// Wait for the transport to become ready instead of failing fast.
    ///
    /// `None` leaves the decision to the defaults of the connection.
    wait_for_ready: Option<bool>,
}

impl CallOptions {
    /// Creates call options with nothing set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns whether the call waits for the transport to become ready.
    ///
    /// Calls fail fast unless told otherwise.
    pub fn wait_for_ready(&self) -> bool {
        self.wait_for_ready.unwrap_or(false)
    }

    /// Sets whether the call waits for the transport to become ready.
    pub fn set_wait_for_ready(&mut self, value: bool) {
        self.wait_for_ready = Some(value)
    }

    /// Returns the options with unset values taken from `defaults`.
    pub fn or(self, defaults: CallOptions) -> Self {
        CallOptions {
            wait_for_ready: self.wait_for_ready.or(defaults.wait_for_ready),
        }
    }
}

//------------ InvokeFuture --------------------------------------------------

/// The future returned by invoking a call.
pub type InvokeFuture<'a, T, E> =
    Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

//------------ Invoke --------------------------------------------------------

/// Performs a call over a connection.
///
/// This is the part of the RPC transport that actually sends the request
/// and produces the reply.
pub trait Invoke<Conn, Req> {
    /// The reply of a successful call.
    type Response;

    /// The error of a failed call.
    type Error;

    /// Invokes `method` with `request` over `conn`.
    fn invoke<'a>(
        &'a self,
        method: &'a str,
        request: Req,
        conn: &'a Conn,
        options: &'a CallOptions,
    ) -> InvokeFuture<'a, Self::Response, Self::Error>
    where
        Req: 'a;
}

impl<Conn, Req, T: Invoke<Conn, Req> + ?Sized> Invoke<Conn, Req> for &T {
    type Response = T::Response;
    type Error = T::Error;

    fn invoke<'a>(
        &'a self,
        method: &'a str,
        request: Req,
        conn: &'a Conn,
        options: &'a CallOptions,
    ) -> InvokeFuture<'a, Self::Response, Self::Error>
    where
        Req: 'a,
    {
        (**self).invoke(method, request, conn, options)
    }
}

//------------ Intercept -----------------------------------------------------

/// A hook run for every outgoing call.
pub trait Intercept<Conn> {
    /// Intercepts a call.
    ///
    /// The interceptor gets everything the call consists of, including the
    /// connection supplied by the caller, if any, and the invocation that
    /// performs the call. It is responsible for eventually invoking it.
    fn intercept<'a, Req, I>(
        &'a self,
        method: &'a str,
        request: Req,
        conn: Option<&'a Conn>,
        invoker: &'a I,
        options: &'a CallOptions,
    ) -> InvokeFuture<'a, I::Response, I::Error>
    where
        I: Invoke<Conn, Req> + ?Sized,
        Req: 'a;
}

//------------ PoolInterceptor -----------------------------------------------

/// An interceptor dispatching calls round-robin over a pool.
pub struct PoolInterceptor<Conn> {
    /// The pool to take connections from.
    pool: Arc<Pool<Conn>>,
}

impl<Conn> PoolInterceptor<Conn> {
    /// Creates an interceptor for the given pool.
    pub fn new(pool: Arc<Pool<Conn>>) -> Self {
        Self { pool }
    }

    /// Returns the pool of the interceptor.
    pub fn pool(&self) -> &Arc<Pool<Conn>> {
        &self.pool
    }
}

impl<Conn> Intercept<Conn> for PoolInterceptor<Conn> {
    fn intercept<'a, Req, I>(
        &'a self,
        method: &'a str,
        request: Req,
        _conn: Option<&'a Conn>,
        invoker: &'a I,
        options: &'a CallOptions,
    ) -> InvokeFuture<'a, I::Response, I::Error>
    where
        I: Invoke<Conn, Req> + ?Sized,
        Req: 'a,
    {
        invoker.invoke(method, request, self.pool.next(), options)
    }
}

impl<Conn> Clone for PoolInterceptor<Conn> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<Conn> fmt::Debug for PoolInterceptor<Conn> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolInterceptor")
            .field("pool", &self.pool)
            .finish()
    }
}

//============ Tests =========================================================
