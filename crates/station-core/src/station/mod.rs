//! WiFi station connection manager
//!
//! [`Station`] owns everything one station connection needs: the validated
//! configuration, the queue radio events arrive on, the state machine that
//! consumes them, and the event group that carries the terminal signals back
//! to whoever is waiting in [`Station::connect`].
//!
//! Two tasks share a `Station`:
//!
//! - the dispatcher, running [`Station::run`] for the lifetime of the
//!   process. It is the only task feeding events to the state machine.
//! - the application, calling [`Station::connect`] once and polling
//!   [`Station::is_connected`] afterwards.
//!
//! ```rust,ignore
//! static STATION: StaticCell<Station<CriticalSectionRawMutex, Stack<'static>>> = StaticCell::new();
//! let station = STATION.init(Station::new(config));
//!
//! spawner.must_spawn(station_task(station, radio_link));
//! match station.connect(radio_link, stack).await? {
//!     ConnectOutcome::Success => info!("IP: {}", station.ip_address_string()?),
//!     outcome => error!("WiFi {}", outcome.label()),
//! }
//! ```

pub mod driver;
pub mod machine;

pub use driver::*;
pub use machine::{Action, StationMachine};

use core::cell::RefCell;
use core::fmt::{Debug, Write};
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::once_lock::OnceLock;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::ConnectionConfig;
use crate::event_group::{EventBits, EventGroup, WaitMode};

/// Event group bit latched when an address has been assigned.
pub const CONNECTED_BIT: EventBits = 1 << 0;
/// Event group bit latched when the retry budget is exhausted.
pub const FAILED_BIT: EventBits = 1 << 1;
const TERMINAL_BITS: EventBits = CONNECTED_BIT | FAILED_BIT;

/// Depth of the radio event queue feeding the dispatcher.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Dotted-decimal IPv4 text. 15 characters plus room to spare.
pub type IpString = heapless::String<16>;

/// Short, bounded description of a driver error.
pub type ErrorDetail = heapless::String<64>;

/// Events the network stack reports to the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationEvent {
    /// The radio finished starting in station mode.
    Started,
    /// The link dropped, or a connect attempt did not complete.
    Disconnected,
    /// DHCP assigned an address.
    GotAddress(Ipv4Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Retrying,
    Connected,
    Failed,
    /// Radio shut down by [`Station::disconnect`].
    Stopped,
}

impl Phase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Retrying => "retrying",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// One-way latch concluding a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSignal {
    Connected,
    Failed,
}

impl TerminalSignal {
    pub const fn bit(self) -> EventBits {
        match self {
            Self::Connected => CONNECTED_BIT,
            Self::Failed => FAILED_BIT,
        }
    }
}

/// Result of [`Station::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    Failure,
    Timeout,
}

impl ConnectOutcome {
    /// Map an event group snapshot to an outcome.
    ///
    /// The connected bit wins over the failed bit; no terminal bit means the
    /// deadline elapsed first.
    pub const fn from_bits(bits: EventBits) -> Self {
        if bits & CONNECTED_BIT != 0 {
            Self::Success
        } else if bits & FAILED_BIT != 0 {
            Self::Failure
        } else {
            Self::Timeout
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "connected",
            Self::Failure => "connection failed",
            Self::Timeout => "connection timed out",
        }
    }
}

/// Connection state maintained by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub retry_count: u32,
    pub connected: bool,
    /// Last assigned address. Stale after a disconnect; check `connected`.
    pub assigned_address: Option<Ipv4Addr>,
}

impl ConnectionState {
    pub const fn new() -> Self {
        Self {
            retry_count: 0,
            connected: false,
            assigned_address: None,
        }
    }
}

/// Unrecoverable radio failures raised while bringing the station up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StationError {
    #[error("radio configuration failed: {0}")]
    Configure(ErrorDetail),
    #[error("radio start failed: {0}")]
    Start(ErrorDetail),
    #[error("connect request failed: {0}")]
    Connect(ErrorDetail),
    #[error("radio shutdown failed: {0}")]
    Disconnect(ErrorDetail),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    #[error("station is not connected")]
    NotConnected,
    #[error("no network interface has been attached")]
    NoInterface,
    #[error("network interface has no IPv4 address")]
    NoAddress,
}

/// Render a driver error into a bounded string, truncating if needed.
pub fn error_detail<E: Debug>(error: &E) -> ErrorDetail {
    let mut detail = ErrorDetail::new();
    let _ = write!(detail, "{:?}", error);
    detail
}

pub struct Station<M: RawMutex, N> {
    config: ConnectionConfig,
    signals: EventGroup<M>,
    events: Channel<M, StationEvent, EVENT_QUEUE_DEPTH>,
    machine: Mutex<M, RefCell<StationMachine>>,
    interface: OnceLock<N>,
    radio_started: AtomicBool,
}

impl<M: RawMutex, N> Station<M, N> {
    pub fn new(config: ConnectionConfig) -> Self {
        let max_retries = config.max_retries();
        Self {
            config,
            signals: EventGroup::new(),
            events: Channel::new(),
            machine: Mutex::new(RefCell::new(StationMachine::new(max_retries))),
            interface: OnceLock::new(),
            radio_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect to the configured access point and wait for the outcome.
    ///
    /// The first call configures and starts the radio; the radio's start
    /// event then kicks off the first connect request. Later calls start a
    /// fresh attempt on the already running radio, or join the attempt still
    /// retrying from an earlier call that timed out. [`Station::run`] must be
    /// running in another task, otherwise nothing consumes radio events and
    /// the call ends in [`ConnectOutcome::Timeout`].
    ///
    /// Returns `Err` only when the radio rejects configuration or start,
    /// which callers should treat as fatal.
    pub async fn connect<D: StationDriver>(
        &self,
        driver: &D,
        interface: N,
    ) -> Result<ConnectOutcome, StationError> {
        info!(
            "Initializing WiFi connection to SSID: {}",
            self.config.ssid()
        );

        if self.is_connected() {
            info!("Already connected to SSID:{}", self.config.ssid());
            return Ok(ConnectOutcome::Success);
        }

        let radio_running = self.radio_started.load(Ordering::Acquire);
        self.signals.clear_bits(TERMINAL_BITS);
        let action = self
            .machine
            .lock(|machine| machine.borrow_mut().begin_attempt(radio_running));

        if self.interface.init(interface).is_err() {
            debug!("Keeping the network interface attached by the first connect");
        }

        if radio_running {
            if action == Some(Action::IssueConnect) {
                info!("Radio already running, requesting a new connection");
                driver
                    .request_connect()
                    .await
                    .map_err(|e| StationError::Connect(error_detail(&e)))?;
            } else {
                info!("Joining the connection attempt already in progress");
            }
        } else {
            driver
                .configure(&self.config)
                .await
                .map_err(|e| StationError::Configure(error_detail(&e)))?;
            driver
                .start()
                .await
                .map_err(|e| StationError::Start(error_detail(&e)))?;
            self.radio_started.store(true, Ordering::Release);
            info!("WiFi initialization finished.");
        }

        let bits = self
            .signals
            .wait_bits_timeout(TERMINAL_BITS, WaitMode::ANY, self.config.connect_timeout())
            .await;

        let outcome = ConnectOutcome::from_bits(bits);
        match outcome {
            ConnectOutcome::Success => info!("Connected to AP SSID:{}", self.config.ssid()),
            ConnectOutcome::Failure => error!("Failed to connect to SSID:{}", self.config.ssid()),
            ConnectOutcome::Timeout => error!(
                "Connection timeout after {} ms",
                self.config.connect_timeout().as_millis()
            ),
        }
        Ok(outcome)
    }

    /// Disconnect from the access point and stop the radio.
    ///
    /// Link loss reported while stopping is not retried. A later
    /// [`Station::connect`] configures and starts the radio again.
    pub async fn disconnect<D: StationDriver>(&self, driver: &D) -> Result<(), StationError> {
        if !self.radio_started.load(Ordering::Acquire) {
            debug!("Radio not running, nothing to disconnect");
            return Ok(());
        }

        self.machine.lock(|machine| machine.borrow_mut().stop());
        self.signals.clear_bits(TERMINAL_BITS);
        driver
            .disconnect()
            .await
            .map_err(|e| StationError::Disconnect(error_detail(&e)))?;
        self.radio_started.store(false, Ordering::Release);
        info!("WiFi disconnected");
        Ok(())
    }

    /// Consume radio events forever, driving the state machine.
    pub async fn run<D: StationDriver>(&self, driver: &D) -> ! {
        loop {
            let event = self.events.receive().await;
            self.dispatch(driver, event).await;
        }
    }

    /// Handle a single event. [`Station::run`] calls this in a loop.
    pub async fn dispatch<D: StationDriver>(&self, driver: &D, event: StationEvent) {
        debug!("Station event: {:?}", event);
        let action = self
            .machine
            .lock(|machine| machine.borrow_mut().handle(event));

        match action {
            Some(Action::IssueConnect) => {
                if let Err(e) = driver.request_connect().await {
                    error!("Connect request rejected by the radio: {:?}", e);
                }
            }
            Some(Action::Signal(signal)) => {
                self.signals.set_bits(signal.bit());
            }
            None => {}
        }
    }

    /// Queue an event for the dispatcher, waiting for space if needed.
    pub async fn publish(&self, event: StationEvent) {
        self.events.send(event).await;
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot().connected
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.machine.lock(|machine| machine.borrow().state())
    }

    pub fn phase(&self) -> Phase {
        self.machine.lock(|machine| machine.borrow().phase())
    }

    /// Raw terminal bits, mostly useful for diagnostics.
    pub fn signal_bits(&self) -> EventBits {
        self.signals.bits() & TERMINAL_BITS
    }
}

impl<M: RawMutex, N: NetInterface> Station<M, N> {
    /// Live address of the attached interface, if it has one.
    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.interface.try_get()?.ipv4_address()
    }

    /// Current address as dotted-decimal text.
    ///
    /// This queries the interface rather than the cached address, so it
    /// reflects a lease renewed since the last connect.
    pub fn ip_address_string(&self) -> Result<IpString, StatusError> {
        let address = self
            .connected_interface()?
            .ipv4_address()
            .ok_or(StatusError::NoAddress)?;

        let mut text = IpString::new();
        // At most 15 characters.
        let _ = write!(text, "{}", address);
        Ok(text)
    }

    /// Lease details of the attached interface while connected.
    pub fn link_info(&self) -> Result<LinkInfo, StatusError> {
        self.connected_interface()?
            .link_info()
            .ok_or(StatusError::NoAddress)
    }

    /// Log the connection status and, while connected, the lease details.
    pub fn log_status(&self) {
        let state = self.snapshot();
        if !state.connected {
            warn!(
                "WiFi Status: Disconnected ({}, {} retries used)",
                self.phase().label(),
                state.retry_count
            );
            return;
        }

        info!("WiFi Status: Connected");
        match self.link_info() {
            Ok(link) => {
                info!("IP Address: {}", link.address);
                info!("Subnet Mask: {}", link.netmask());
                match link.gateway {
                    Some(gateway) => info!("Gateway: {}", gateway),
                    None => info!("Gateway: none"),
                }
                for dns in &link.dns_servers {
                    info!("DNS: {}", dns);
                }
                if let Some([a, b, c, d, e, f]) = link.mac {
                    info!(
                        "MAC Address: {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                        a, b, c, d, e, f
                    );
                }
            }
            Err(e) => warn!("Lease details unavailable: {}", e),
        }
        info!("Configured SSID: {}", self.config.ssid());
        info!("Auth Method: {}", self.config.auth_mode().label());
    }

    fn connected_interface(&self) -> Result<&N, StatusError> {
        if !self.is_connected() {
            return Err(StatusError::NotConnected);
        }
        self.interface.try_get().ok_or(StatusError::NoInterface)
    }
}
