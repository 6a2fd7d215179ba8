//! A fake transport and lookup for driving balanced connections.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rpc_pool::factory::Dial;
use rpc_pool::interceptor::{CallOptions, Invoke, InvokeFuture};
use rpc_pool::pool::Close;
use rpc_pool::resolver::{AddrSet, AddrWatch, Lookup};
use rpc_pool::target::Target;
use rpc_pool::Error;

//------------ Logging -------------------------------------------------------

pub fn init_logging() {
    // Override with env var RUST_LOG, e.g. RUST_LOG=rpc_pool=trace.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

//------------ TestLookup ----------------------------------------------------

/// A lookup answering with whatever addresses it currently holds.
#[derive(Default)]
pub struct TestLookup {
    ips: Mutex<Vec<IpAddr>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl TestLookup {
    pub fn with_ips(ips: &[IpAddr]) -> Arc<Self> {
        let res = Self::default();
        *res.ips.lock() = ips.to_vec();
        Arc::new(res)
    }

    pub fn set_ips(&self, ips: &[IpAddr]) {
        *self.ips.lock() = ips.to_vec();
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Lookup for TestLookup {
    fn lookup<'a>(
        &'a self,
        _host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<AddrSet, io::Error>> + Send + 'a>>
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let res = if self.fail.load(Ordering::Relaxed) {
            Err(io::Error::new(io::ErrorKind::TimedOut, "lookup timed out"))
        } else {
            Ok(self
                .ips
                .lock()
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect())
        };
        Box::pin(async move { res })
    }
}

//------------ FakeConn ------------------------------------------------------

/// A transport connection that only knows its addresses.
pub struct FakeConn {
    pub id: usize,
    pub addrs: AddrWatch,
    open: Arc<AtomicUsize>,
}

impl Close for FakeConn {
    fn close(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), io::Error>> + Send + '_>> {
        Box::pin(async move {
            self.open.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        })
    }
}

//------------ FakeDial ------------------------------------------------------

/// Opens fake connections, numbering them in the order they are dialed.
#[derive(Default)]
pub struct FakeDial {
    next: AtomicUsize,
    fail_at: Option<usize>,
    pub open: Arc<AtomicUsize>,
}

impl FakeDial {
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

impl Dial for FakeDial {
    type Connection = FakeConn;

    fn dial<'a>(
        &'a self,
        _target: &'a Target,
        addrs: AddrWatch,
    ) -> Pin<
        Box<dyn Future<Output = Result<FakeConn, io::Error>> + Send + 'a>,
    > {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Box::pin(async move {
            if self.fail_at == Some(id) {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ));
            }
            self.open.fetch_add(1, Ordering::Relaxed);
            Ok(FakeConn {
                id,
                addrs,
                open: self.open.clone(),
            })
        })
    }
}

//------------ Echo ----------------------------------------------------------

/// Answers every call with the connection used and its addresses.
pub struct Echo;

impl Invoke<FakeConn, &'static str> for Echo {
    type Response = (usize, AddrSet);
    type Error = Error;

    fn invoke<'a>(
        &'a self,
        _method: &'a str,
        _request: &'static str,
        conn: &'a FakeConn,
        options: &'a CallOptions,
    ) -> InvokeFuture<'a, Self::Response, Self::Error>
    where
        &'static str: 'a,
    {
        let mut addrs = conn.addrs.clone();
        let wait_for_ready = options.wait_for_ready();
        Box::pin(async move {
            let set = addrs.ready(wait_for_ready).await?;
            Ok((conn.id, set))
        })
    }
}
