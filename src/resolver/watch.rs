//! Handing resolver updates to a transport.
//!
//! A [`WatchSink`] stores the latest update of a resolver in a single-slot
//! [`tokio::sync::watch`] channel. Publishing never waits for the consumer;
//! a consumer that falls behind simply sees the newest state when it looks
//! again. The consuming side is an [`AddrWatch`].

use std::boxed::Box;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;

use crate::error::Error;

use super::{AddrSet, Resolver, Sink};

//------------ Resolution ----------------------------------------------------

/// The state of resolution as seen by a consumer.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    /// The addresses published last.
    addrs: AddrSet,

    /// The error of the last lookup if it failed.
    ///
    /// Cleared once new addresses are published.
    error: Option<Error>,
}

impl Resolution {
    /// Returns the addresses published last.
    pub fn addrs(&self) -> &AddrSet {
        &self.addrs
    }

    /// Returns the error of the last lookup if it failed.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

//------------ WatchSink -----------------------------------------------------

/// A sink storing the latest resolver update in a watch channel.
#[derive(Debug)]
pub struct WatchSink {
    /// The sending side of the channel.
    tx: watch::Sender<Resolution>,
}

impl WatchSink {
    /// Creates a new sink and the receiving side of its channel.
    pub fn channel() -> (Self, watch::Receiver<Resolution>) {
        let (tx, rx) = watch::channel(Resolution::default());
        (Self { tx }, rx)
    }
}

impl Sink for WatchSink {
    fn publish(&self, addrs: &AddrSet) {
        self.tx.send_modify(|state| {
            state.addrs = addrs.clone();
            state.error = None;
        })
    }

    fn report_error(&self, err: &Error) {
        self.tx.send_modify(|state| state.error = Some(err.clone()))
    }

    fn closed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.tx.closed())
    }
}

//------------ AddrWatch -----------------------------------------------------

/// The addresses of a target as kept current by its resolver.
///
/// Once all clones of a watch are dropped, the resolver task feeding it
/// ends.
#[derive(Clone, Debug)]
pub struct AddrWatch {
    /// The receiving side of the resolver's channel.
    rx: watch::Receiver<Resolution>,

    /// The resolver feeding the channel.
    resolver: Resolver,
}

impl AddrWatch {
    /// Creates a new watch from its parts.
    pub fn new(rx: watch::Receiver<Resolution>, resolver: Resolver) -> Self {
        Self { rx, resolver }
    }

    /// Returns the addresses currently known.
    pub fn current(&self) -> AddrSet {
        self.rx.borrow().addrs.clone()
    }

    /// Returns the error of the last lookup if it failed.
    pub fn last_error(&self) -> Option<Error> {
        self.rx.borrow().error.clone()
    }

    /// Waits for the next update and returns the addresses known then.
    pub async fn changed(&mut self) -> Result<AddrSet, Error> {
        self.rx.changed().await.map_err(|_| Error::ResolverClosed)?;
        Ok(self.rx.borrow_and_update().addrs.clone())
    }

    /// Returns the known addresses, waiting for some if requested.
    ///
    /// If no addresses are known and `wait_for_ready` is false, this fails
    /// right away with the last lookup error or [`Error::NoAddresses`].
    pub async fn ready(
        &mut self,
        wait_for_ready: bool,
    ) -> Result<AddrSet, Error> {
        {
            let state = self.rx.borrow_and_update();
            if !state.addrs.is_empty() {
                return Ok(state.addrs.clone());
            }
            if !wait_for_ready {
                return Err(state.error.clone().unwrap_or(Error::NoAddresses));
            }
        }
        let state = self
            .rx
            .wait_for(|state| !state.addrs.is_empty())
            .await
            .map_err(|_| Error::ResolverClosed)?;
        Ok(state.addrs.clone())
    }

    /// Asks the resolver for an early lookup.
    pub fn resolve_now(&self) {
        self.resolver.resolve_now()
    }

    /// Returns the resolver feeding this watch.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

//============ Tests =========================================================
