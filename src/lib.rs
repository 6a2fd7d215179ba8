//! Client-side load balancing over a pool of RPC connections.
//!
//! A single RPC transport connection multiplexes all calls over one
//! underlying connection to one backend address. This crate spreads calls
//! over several such connections instead. It provides a number of building
//! blocks for this that can be used on their own or together through the
//! [factory].
//!
//! # Modules
//!
//! * [pool] contains the fixed-size [`Pool`] of connections that hands out
//!   its connections in round-robin order,
//! * [interceptor] contains the [`PoolInterceptor`] that sends every call
//!   over the next connection of a pool,
//! * [resolver] keeps the addresses of a target current by looking them up
//!   periodically and picks the resolver for a target by its scheme,
//! * [target] parses target strings such as `dns:///example.com:443`, and
//! * [factory] ties it all together: it opens a pool for a target with a
//!   resolver per connection and hands back a [`BalancedConnection`].
//!
//! The transport itself is not part of this crate. It is plugged in through
//! the [`Dial`][factory::Dial] and [`Invoke`][interceptor::Invoke] traits.
//!
//! # Reference of Feature Flags
//!
//! * `resolv`: Looks up DNS targets through the stub resolver of the
//!   [domain](https://github.com/NLnetLabs/domain) crate. Enabled by
//!   default. Without it, a [`Registry`][resolver::Registry] has to be
//!   filled with resolvers by hand.

#![warn(missing_docs)]
#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod factory;
pub mod interceptor;
pub mod pool;
pub mod resolver;
pub mod target;

#[cfg(test)]
mod logging;

pub use self::error::Error;
#[cfg(feature = "resolv")]
pub use self::factory::open_balanced;
pub use self::factory::{BalancedConnection, Factory};
pub use self::interceptor::{CallOptions, PoolInterceptor};
pub use self::pool::Pool;
