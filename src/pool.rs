//! A fixed-size pool of transport connections.
//!
//! A [`Pool`] owns a number of independently established connections to
//! the same logical target. Every call to [`Pool::next`] hands out the next
//! connection in round-robin order. The pool is built once with all
//! connections open, no connection is ever replaced, and
//! [`Pool::close`] closes all of them.
//!
//! Connections are established through the [`Connect`] trait which carries
//! the target and whatever options the transport needs.

use std::boxed::Box;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::vec::Vec;

use futures_util::future::join_all;
use tracing::{debug, trace, warn};

use crate::error::Error;

//------------ Connect -------------------------------------------------------

/// Establish a connection asynchronously.
pub trait Connect {
    /// The type of an established connection.
    type Connection;

    /// Returns a future establishing a new connection.
    ///
    /// The `index` is the position the connection will take in the pool.
    fn connect(
        &self,
        index: usize,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Self::Connection, io::Error>>
                + Send
                + '_,
        >,
    >;
}

//------------ Close ---------------------------------------------------------

/// Close a connection.
pub trait Close {
    /// Returns a future closing the connection.
    fn close(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), io::Error>> + Send + '_>>;
}

impl<T: Close + ?Sized> Close for Arc<T> {
    fn close(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), io::Error>> + Send + '_>> {
        (**self).close()
    }
}

//------------ Pool ----------------------------------------------------------

/// A round-robin pool of connections.
pub struct Pool<Conn> {
    /// The connections. Never empty.
    conns: Box<[Conn]>,

    /// The selection counter.
    ///
    /// Wraps around on overflow which, combined with taking the remainder,
    /// still gives a valid index.
    next: AtomicU32,

    /// Whether [`Pool::close`] has been called.
    closed: AtomicBool,
}

impl<Conn: Close> Pool<Conn> {
    /// Opens a pool of `size` connections.
    ///
    /// All connection attempts run concurrently and are awaited before this
    /// returns. If any of them fails, the connections that did open are
    /// closed again and the error for the lowest failed index is returned.
    pub async fn open<C>(connect: &C, size: usize) -> Result<Self, Error>
    where
        C: Connect<Connection = Conn> + ?Sized,
    {
        if size == 0 {
            return Err(Error::Config("pool size must be at least 1"));
        }

        let results =
            join_all((0..size).map(|index| connect.connect(index))).await;

        let mut conns = Vec::with_capacity(size);
        let mut failure = None;
        for (index, res) in results.into_iter().enumerate() {
            match res {
                Ok(conn) => conns.push(conn),
                Err(err) => {
                    warn!(index, "failed to open pool connection: {err}");
                    if failure.is_none() {
                        failure = Some(Error::Connect {
                            index,
                            source: Arc::new(err),
                        });
                    }
                }
            }
        }

        if let Some(err) = failure {
            for conn in &conns {
                if let Err(err) = conn.close().await {
                    warn!("failed to close connection of failed pool: {err}");
                }
            }
            return Err(err);
        }

        debug!(size, "opened connection pool");
        Ok(Self::from_conns(conns))
    }

    /// Closes all connections of the pool.
    ///
    /// Closing continues past failed connections. The returned error lists
    /// all of them. Only the first call does any work, later calls return
    /// `Ok(())` right away.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut failures = Vec::new();
        for (index, conn) in self.conns.iter().enumerate() {
            if let Err(err) = conn.close().await {
                warn!(index, "failed to close pool connection: {err}");
                failures.push((index, Arc::new(err)));
            }
        }
        debug!(
            size = self.conns.len(),
            failed = failures.len(),
            "closed connection pool"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(failures))
        }
    }
}

impl<Conn> Pool<Conn> {
    /// Creates a pool from already established connections.
    ///
    /// # Panics
    ///
    /// Panics if `conns` is empty.
    pub fn from_conns(conns: Vec<Conn>) -> Self {
        Self::with_counter(conns, 0)
    }

    /// Creates a pool with the given initial counter value.
    fn with_counter(conns: Vec<Conn>, counter: u32) -> Self {
        assert!(!conns.is_empty(), "a pool needs at least one connection");
        Pool {
            conns: conns.into_boxed_slice(),
            next: AtomicU32::new(counter),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the next connection in round-robin order.
    pub fn next(&self) -> &Conn {
        let index = self.next_index();
        trace!(index, "selected pool connection");
        &self.conns[index]
    }

    /// Advances the counter and returns the index it selects.
    fn next_index(&self) -> usize {
        let counter =
            self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        // The pool size is way below u32::MAX in practice, but widen rather
        // than truncate.
        (u64::from(counter) % self.conns.len() as u64) as usize
    }

    /// Returns the number of connections in the pool.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Returns whether the pool is empty. It never is.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Returns the connection at the given index.
    pub fn get(&self, index: usize) -> Option<&Conn> {
        self.conns.get(index)
    }

    /// Returns an iterator over all connections.
    pub fn iter(&self) -> slice::Iter<'_, Conn> {
        self.conns.iter()
    }

    /// Returns whether [`Pool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<Conn> fmt::Debug for Pool<Conn> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("conns", &format_args!("[_; {}]", self.conns.len()))
            .field("next", &self.next)
            .field("closed", &self.closed)
            .finish()
    }
}

//============ Tests =========================================================
