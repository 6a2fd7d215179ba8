//! Periodic name resolution.
//!
//! A resolver keeps the set of addresses behind a host name current. It
//! consists of two parts: a [`ResolverTask`] that needs to be spawned as a
//! separate task and does the actual work, and a [`Resolver`] handle that
//! can be used to ask for an early lookup or to stop the task.
//!
//! The task looks up the host once right away and then every
//! [poll interval][Config::poll_interval]. Whenever the set of addresses
//! differs from the one published last, the new set is handed to a
//! [`Sink`]. Sets equal to the last one are not published again. Failed
//! lookups are reported to the sink, too, but do not end the task: the
//! next lookup happens on schedule.
//!
//! The task ends when it is [stopped][Resolver::stop] or when its sink
//! reports that nobody is [listening][Sink::closed] anymore.
//!
//! Resolvers are usually not created directly but through a
//! [`BuildResolver`] registered with a [`Registry`] for a scheme.

use std::boxed::Box;
use std::cmp;
use std::collections::BTreeSet;
use std::fmt;
use std::future::{self, Future};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::string::String;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::target::DEFAULT_PORT;

//------------ Sub-modules ---------------------------------------------------

pub mod dns;
pub mod registry;
pub mod watch;

pub use self::registry::{BuildResolver, Registry};
pub use self::watch::{AddrWatch, Resolution, WatchSink};

//------------ Configuration Constants ---------------------------------------

/// The default minimum time between two lookups.
const DEF_MIN_FREQUENCY: Duration = Duration::from_secs(30);

//------------ AddrSet -------------------------------------------------------

/// A set of resolved addresses.
pub type AddrSet = BTreeSet<SocketAddr>;

//------------ Lookup --------------------------------------------------------

/// Looks up the addresses of a host.
pub trait Lookup: Send + Sync {
    /// Looks up all addresses of `host` and combines them with `port`.
    fn lookup<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<AddrSet, io::Error>> + Send + 'a>>;
}

//------------ Sink ----------------------------------------------------------

/// Receives the updates of a resolver.
///
/// Both methods are called from the resolver task and must not block.
pub trait Sink: Send + Sync {
    /// Publishes a new set of addresses.
    fn publish(&self, addrs: &AddrSet);

    /// Reports a failed lookup.
    fn report_error(&self, err: &Error);

    /// Returns a future that resolves once the consumer has gone away.
    ///
    /// The default implementation never resolves.
    fn closed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(future::pending())
    }
}

//------------ Config --------------------------------------------------------

/// Configuration of a resolver.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The minimum time between two lookups.
    min_frequency: Duration,

    /// The time between two regular lookups.
    ///
    /// If this is `None` or less than `min_frequency`, the latter is used.
    refresh_interval: Option<Duration>,

    /// The port used if the target does not contain one.
    default_port: u16,
}

impl Config {
    /// Creates a configuration by applying `options` to the default.
    ///
    /// The options are applied in order, so later options win over earlier
    /// ones. Fails if any option is given an invalid value.
    pub fn from_options(
        options: impl IntoIterator<Item = BuilderOption>,
    ) -> Result<Self, Error> {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config)?;
        }
        Ok(config)
    }

    /// Returns the minimum time between two lookups.
    pub fn min_frequency(&self) -> Duration {
        self.min_frequency
    }

    /// Sets the minimum time between two lookups.
    ///
    /// A duration of zero is rejected.
    pub fn set_min_frequency(&mut self, value: Duration) -> Result<(), Error> {
        if value.is_zero() {
            return Err(Error::Config("minimum frequency must be positive"));
        }
        self.min_frequency = value;
        Ok(())
    }

    /// Returns the time between two regular lookups, if set.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Sets the time between two regular lookups.
    ///
    /// The value `None` polls as often as the minimum frequency allows.
    pub fn set_refresh_interval(&mut self, value: Option<Duration>) {
        self.refresh_interval = value
    }

    /// Returns the port used if the target does not contain one.
    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Sets the port used if the target does not contain one.
    pub fn set_default_port(&mut self, value: u16) {
        self.default_port = value
    }

    /// Returns the time between the start of two lookups.
    pub fn poll_interval(&self) -> Duration {
        match self.refresh_interval {
            Some(refresh) => cmp::max(refresh, self.min_frequency),
            None => self.min_frequency,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_frequency: DEF_MIN_FREQUENCY,
            refresh_interval: None,
            default_port: DEFAULT_PORT,
        }
    }
}

//------------ BuilderOption -------------------------------------------------

/// An option modifying the configuration of a resolver builder.
pub struct BuilderOption(
    Box<dyn FnOnce(&mut Config) -> Result<(), Error> + Send>,
);

impl BuilderOption {
    /// Creates an option from a function modifying the configuration.
    pub fn new(
        op: impl FnOnce(&mut Config) -> Result<(), Error> + Send + 'static,
    ) -> Self {
        Self(Box::new(op))
    }

    /// Applies the option to a configuration.
    pub fn apply(self, config: &mut Config) -> Result<(), Error> {
        (self.0)(config)
    }
}

impl fmt::Debug for BuilderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BuilderOption")
    }
}

/// Sets the minimum time between two lookups.
pub fn with_min_frequency(value: Duration) -> BuilderOption {
    BuilderOption::new(move |config| config.set_min_frequency(value))
}

/// Sets the time between two regular lookups.
pub fn with_refresh_interval(value: Duration) -> BuilderOption {
    BuilderOption::new(move |config| {
        config.set_refresh_interval(Some(value));
        Ok(())
    })
}

/// Sets the port used if the target does not contain one.
pub fn with_default_port(value: u16) -> BuilderOption {
    BuilderOption::new(move |config| {
        config.set_default_port(value);
        Ok(())
    })
}

//------------ Signals -------------------------------------------------------

/// Signals sent from a [`Resolver`] to its task.
#[derive(Debug, Default)]
struct Signals {
    /// Set once the task should stop.
    stop: AtomicBool,

    /// Wakes up the task after `stop` has been set.
    stop_notify: Notify,

    /// Asks for an early lookup.
    resolve_now: Notify,
}

//------------ Resolver ------------------------------------------------------

/// A handle to a running resolver task.
///
/// Dropping all handles does not stop the task.
#[derive(Clone, Debug)]
pub struct Resolver {
    /// The signals shared with the task.
    signals: Arc<Signals>,
}

impl Resolver {
    /// Asks the resolver for an early lookup.
    ///
    /// The lookup happens right away if the last one is at least the
    /// minimum frequency ago. Otherwise it happens once that much time has
    /// passed.
    pub fn resolve_now(&self) {
        self.signals.resolve_now.notify_one()
    }

    /// Stops the resolver task.
    pub fn stop(&self) {
        self.signals.stop.store(true, Ordering::Release);
        self.signals.stop_notify.notify_one()
    }

    /// Returns whether the resolver has been asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.signals.stop.load(Ordering::Acquire)
    }
}

//------------ ResolverTask --------------------------------------------------

/// The task keeping the addresses of a host current.
pub struct ResolverTask {
    /// The host name or address to look up.
    host: String,

    /// The port combined with the resolved addresses.
    port: u16,

    /// The configuration.
    config: Config,

    /// Performs the lookups.
    lookup: Arc<dyn Lookup>,

    /// Receives the results.
    sink: Arc<dyn Sink>,

    /// The signals shared with the handles.
    signals: Arc<Signals>,

    /// The set published last.
    published: Option<AddrSet>,

    /// When the last lookup started.
    last_lookup: Option<Instant>,
}

impl ResolverTask {
    /// Creates a new resolver for the given host and port.
    ///
    /// Nothing happens until [`ResolverTask::run`] is spawned.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        config: Config,
        lookup: Arc<dyn Lookup>,
        sink: Arc<dyn Sink>,
    ) -> (Resolver, Self) {
        let signals = Arc::new(Signals::default());
        (
            Resolver {
                signals: signals.clone(),
            },
            ResolverTask {
                host: host.into(),
                port,
                config,
                lookup,
                sink,
                signals,
                published: None,
                last_lookup: None,
            },
        )
    }

    /// Runs the resolver until it is stopped or its sink is closed.
    pub async fn run(mut self) {
        debug!(host = %self.host, port = self.port, "resolver started");

        // Addresses don't need resolving, ever.
        if let Ok(addr) = self.host.parse::<IpAddr>() {
            let addrs = AddrSet::from([SocketAddr::new(addr, self.port)]);
            self.sink.publish(&addrs);
            if !self.is_stopped() {
                tokio::select! {
                    _ = self.signals.stop_notify.notified() => { }
                    _ = self.sink.closed() => { }
                }
            }
            debug!(host = %self.host, "resolver stopped");
            return;
        }

        let mut next = Instant::now();
        loop {
            if self.is_stopped() {
                break;
            }
            tokio::select! {
                _ = sleep_until(next) => { }
                _ = self.signals.resolve_now.notified() => {
                    next = cmp::min(next, self.earliest_lookup());
                    continue;
                }
                _ = self.signals.stop_notify.notified() => {
                    continue;
                }
                _ = self.sink.closed() => {
                    trace!(host = %self.host, "resolver sink closed");
                    break;
                }
            }
            self.last_lookup = Some(Instant::now());
            let res = tokio::select! {
                res = self.lookup.lookup(&self.host, self.port) => res,
                _ = self.signals.stop_notify.notified() => {
                    trace!(host = %self.host, "lookup abandoned");
                    break;
                }
                _ = self.sink.closed() => {
                    trace!(host = %self.host, "resolver sink closed");
                    break;
                }
            };
            self.process(res);
            next = Instant::now() + self.config.poll_interval();
        }

        debug!(host = %self.host, "resolver stopped");
    }

    /// Returns whether the task has been asked to stop.
    fn is_stopped(&self) -> bool {
        self.signals.stop.load(Ordering::Acquire)
    }

    /// Returns the earliest time the next lookup may start.
    fn earliest_lookup(&self) -> Instant {
        match self.last_lookup {
            Some(last) => last + self.config.min_frequency(),
            None => Instant::now(),
        }
    }

    /// Hands the result of a lookup to the sink.
    fn process(&mut self, res: Result<AddrSet, io::Error>) {
        match res {
            Ok(addrs) if addrs.is_empty() => {
                warn!(host = %self.host, "lookup produced no addresses");
                self.sink.report_error(&Error::NoAddresses);
            }
            Ok(addrs) => {
                if self.published.as_ref() == Some(&addrs) {
                    trace!(host = %self.host, "address set unchanged");
                    return;
                }
                debug!(
                    host = %self.host,
                    count = addrs.len(),
                    "publishing address set"
                );
                self.sink.publish(&addrs);
                self.published = Some(addrs);
            }
            Err(err) => {
                warn!(host = %self.host, "lookup failed: {err}");
                self.sink.report_error(&Error::Resolve(Arc::new(err)));
            }
        }
    }
}

impl fmt::Debug for ResolverTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverTask")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("config", &self.config)
            .field("published", &self.published)
            .finish()
    }
}

//============ Tests =========================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::init_logging;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// What a sink has been told.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Event {
        Publish(AddrSet),
        Error(bool),
    }

    /// A sink recording all events.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<Event>>,
    }

    impl Sink for RecordingSink {
        fn publish(&self, addrs: &AddrSet) {
            self.events.lock().push(Event::Publish(addrs.clone()))
        }

        fn report_error(&self, err: &Error) {
            self.events.lock().push(Event::Error(err.is_resolve()))
        }
    }

    /// A lookup returning scripted results.
    ///
    /// Once the script runs out, the last result is repeated.
    pub(crate) struct ScriptedLookup {
        script: Mutex<VecDeque<Result<AddrSet, io::ErrorKind>>>,
        last: Mutex<Option<Result<AddrSet, io::ErrorKind>>>,
        pub(crate) calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedLookup {
        pub(crate) fn new(
            script: impl IntoIterator<Item = Result<AddrSet, io::ErrorKind>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                last: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Lookup for ScriptedLookup {
        fn lookup<'a>(
            &'a self,
            _host: &'a str,
            _port: u16,
        ) -> Pin<
            Box<dyn Future<Output = Result<AddrSet, io::Error>> + Send + 'a>,
        > {
            self.calls.lock().push(Instant::now());
            let next = self.script.lock().pop_front();
            let res = match next {
                Some(res) => {
                    *self.last.lock() = Some(res.clone());
                    res
                }
                None => self.last.lock().clone().unwrap_or(Ok(AddrSet::new())),
            };
            Box::pin(async move { res.map_err(io::Error::from) })
        }
    }

    /// A lookup that never completes.
    #[derive(Default)]
    pub(crate) struct HangingLookup {
        pub(crate) calls: Mutex<usize>,
    }

    impl Lookup for HangingLookup {
        fn lookup<'a>(
            &'a self,
            _host: &'a str,
            _port: u16,
        ) -> Pin<
            Box<dyn Future<Output = Result<AddrSet, io::Error>> + Send + 'a>,
        > {
            *self.calls.lock() += 1;
            Box::pin(future::pending())
        }
    }

    pub(crate) fn addrs(ports: &[u16]) -> AddrSet {
        ports
            .iter()
            .map(|port| SocketAddr::from(([192, 0, 2, 1], *port)))
            .collect()
    }

    fn spawn(
        host: &str,
        config: Config,
        lookup: Arc<ScriptedLookup>,
    ) -> (Resolver, Arc<RecordingSink>, tokio::task::JoinHandle<()>) {
        let sink = Arc::new(RecordingSink::default());
        let (resolver, task) =
            ResolverTask::new(host, 443, config, lookup, sink.clone());
        (resolver, sink, tokio::spawn(task.run()))
    }

    fn config(min_frequency: Duration) -> Config {
        Config::from_options([with_min_frequency(min_frequency)]).unwrap()
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn unchanged_sets_are_not_republished() {
        init_logging();
        let freq = Duration::from_secs(10);
        let lookup = Arc::new(ScriptedLookup::new([
            Ok(addrs(&[1, 2])),
            Ok(addrs(&[1, 2])),
            Ok(addrs(&[1, 3])),
        ]));
        let (resolver, sink, task) =
            spawn("example.com", config(freq), lookup.clone());

        tokio::time::sleep(freq * 2 + freq / 2).await;
        resolver.stop();
        task.await.unwrap();

        let times = lookup.calls.lock().clone();
        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|pair| pair[1] - pair[0] >= freq));
        assert_eq!(
            *sink.events.lock(),
            vec![
                Event::Publish(addrs(&[1, 2])),
                Event::Publish(addrs(&[1, 3]))
            ]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failures_do_not_stop_polling() {
        init_logging();
        let freq = Duration::from_secs(5);
        let lookup = Arc::new(ScriptedLookup::new([
            Ok(addrs(&[1])),
            Err(io::ErrorKind::TimedOut),
            Ok(addrs(&[2])),
            Ok(addrs(&[2])),
        ]));
        let (resolver, sink, task) =
            spawn("example.com", config(freq), lookup.clone());

        tokio::time::sleep(freq * 3 + freq / 2).await;
        assert!(!task.is_finished());
        resolver.stop();
        task.await.unwrap();

        assert_eq!(lookup.calls.lock().len(), 4);
        assert_eq!(
            *sink.events.lock(),
            vec![
                Event::Publish(addrs(&[1])),
                Event::Error(true),
                Event::Publish(addrs(&[2])),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn empty_result_is_an_error() {
        let lookup = Arc::new(ScriptedLookup::new([Ok(AddrSet::new())]));
        let (resolver, sink, task) =
            spawn("example.com", Config::default(), lookup);
        tokio::time::sleep(Duration::from_secs(1)).await;
        resolver.stop();
        task.await.unwrap();
        assert_eq!(*sink.events.lock(), vec![Event::Error(false)]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn refresh_interval_is_bounded_below() {
        let mut config = config(Duration::from_secs(10));
        config.set_refresh_interval(Some(Duration::from_secs(1)));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));

        let lookup = Arc::new(ScriptedLookup::new([Ok(addrs(&[1]))]));
        let (resolver, _sink, task) =
            spawn("example.com", config, lookup.clone());
        tokio::time::sleep(Duration::from_secs(25)).await;
        resolver.stop();
        task.await.unwrap();
        assert_eq!(lookup.calls.lock().len(), 3);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn resolve_now_is_rate_limited() {
        init_logging();
        let freq = Duration::from_secs(10);
        let mut config = config(freq);
        config.set_refresh_interval(Some(Duration::from_secs(3600)));
        let lookup = Arc::new(ScriptedLookup::new([Ok(addrs(&[1]))]));
        let (resolver, _sink, task) =
            spawn("example.com", config, lookup.clone());

        // Let the initial lookup happen.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(lookup.calls.lock().len(), 1);

        // Too early: deferred until the minimum frequency has passed.
        resolver.resolve_now();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(lookup.calls.lock().len(), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(lookup.calls.lock().len(), 2);

        // Long enough ago: right away.
        tokio::time::sleep(Duration::from_secs(20)).await;
        resolver.resolve_now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(lookup.calls.lock().len(), 3);

        resolver.stop();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn addresses_are_published_once() {
        let lookup = Arc::new(ScriptedLookup::new([]));
        let (resolver, sink, task) =
            spawn("192.0.2.1", config(Duration::from_secs(1)), lookup.clone());
        tokio::time::sleep(Duration::from_secs(10)).await;
        resolver.stop();
        task.await.unwrap();

        assert!(lookup.calls.lock().is_empty());
        let expected: AddrSet = [SocketAddr::from(([192, 0, 2, 1], 443))]
            .into_iter()
            .collect();
        assert_eq!(*sink.events.lock(), vec![Event::Publish(expected)]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn stop_ends_a_pending_lookup() {
        init_logging();
        let lookup = Arc::new(HangingLookup::default());
        let sink = Arc::new(RecordingSink::default());
        let (resolver, task) = ResolverTask::new(
            "example.com",
            443,
            Config::default(),
            lookup.clone(),
            sink.clone(),
        );
        let task = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*lookup.calls.lock(), 1);
        resolver.stop();
        tokio::time::timeout(Duration::from_secs(3600), task)
            .await
            .expect("resolver task still running")
            .unwrap();
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn zero_min_frequency_is_rejected() {
        assert!(matches!(
            Config::from_options([with_min_frequency(Duration::ZERO)]),
            Err(Error::Config(_))
        ));
        let mut config = Config::default();
        assert!(config.set_min_frequency(Duration::ZERO).is_err());
        assert_eq!(config.min_frequency(), DEF_MIN_FREQUENCY);
    }

    #[test]
    fn options_apply_in_order() {
        let config = Config::from_options([
            with_min_frequency(Duration::from_secs(5)),
            with_default_port(8443),
            with_min_frequency(Duration::from_secs(7)),
        ])
        .unwrap();
        assert_eq!(config.min_frequency(), Duration::from_secs(7));
        assert_eq!(config.default_port(), 8443);
        assert_eq!(config.refresh_interval(), None);
    }
}
