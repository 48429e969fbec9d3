//! Radio and network interface seams
//!
//! The station never talks to hardware directly. It drives a
//! [`StationDriver`] and reads addresses through a [`NetInterface`].
//! Firmware backs the driver with a [`RadioLink`] serviced by a task that
//! owns the real WiFi controller; tests implement the traits on mocks.

use core::fmt::Debug;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::ConnectionConfig;

/// Control surface of a WiFi radio in station mode.
///
/// Connection progress is never returned from these calls; it is reported
/// asynchronously as [`StationEvent`](super::StationEvent)s.
pub trait StationDriver {
    type Error: Debug;

    /// Apply credentials and minimum auth mode, and select station mode.
    fn configure(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Start the radio. Completion is reported as `StationEvent::Started`.
    fn start(&self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Ask the radio to join the configured access point.
    fn request_connect(&self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Leave the access point and stop the radio.
    fn disconnect(&self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// DNS servers kept per lease.
pub const MAX_DNS_SERVERS: usize = 3;

/// Lease and hardware details of the station interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv4Addr>,
    pub dns_servers: heapless::Vec<Ipv4Addr, MAX_DNS_SERVERS>,
    pub mac: Option<[u8; 6]>,
}

impl LinkInfo {
    /// Subnet mask for `prefix_len`.
    pub fn netmask(&self) -> Ipv4Addr {
        let host_bits = 32u32.saturating_sub(u32::from(self.prefix_len));
        Ipv4Addr::from(u32::MAX.checked_shl(host_bits).unwrap_or(0))
    }
}

/// Live view of the station network interface.
pub trait NetInterface {
    /// Address currently assigned to the interface, queried afresh.
    fn ipv4_address(&self) -> Option<Ipv4Addr>;

    /// Current lease details, or `None` without an address.
    fn link_info(&self) -> Option<LinkInfo>;
}

impl<T: NetInterface + ?Sized> NetInterface for &T {
    fn ipv4_address(&self) -> Option<Ipv4Addr> {
        (**self).ipv4_address()
    }

    fn link_info(&self) -> Option<LinkInfo> {
        (**self).link_info()
    }
}

/// Depth of the command queue between the station and the radio task.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    Configure(ConnectionConfig),
    Start,
    Connect,
    Disconnect,
}

impl RadioCommand {
    /// Whether the radio task must answer with [`RadioLink::reply`].
    pub const fn expects_reply(&self) -> bool {
        !matches!(self, Self::Connect)
    }
}

/// Command queue plus reply slot connecting the station to a radio task.
///
/// `Configure`, `Start` and `Disconnect` wait for the radio task to reply;
/// `Connect` is fire-and-forget because its result arrives as an event.
pub struct RadioLink<M: RawMutex, E> {
    commands: Channel<M, RadioCommand, COMMAND_QUEUE_DEPTH>,
    replies: Signal<M, Result<(), E>>,
}

impl<M: RawMutex, E> RadioLink<M, E> {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            replies: Signal::new(),
        }
    }

    /// Next command for the radio task to execute.
    pub async fn next_command(&self) -> RadioCommand {
        self.commands.receive().await
    }

    /// Report the result of a command that expects a reply.
    pub fn reply(&self, result: Result<(), E>) {
        self.replies.signal(result);
    }

    async fn request(&self, command: RadioCommand) -> Result<(), E> {
        self.replies.reset();
        self.commands.send(command).await;
        self.replies.wait().await
    }
}

impl<M: RawMutex, E> Default for RadioLink<M, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, E: Debug> StationDriver for RadioLink<M, E> {
    type Error = E;

    async fn configure(&self, config: &ConnectionConfig) -> Result<(), E> {
        self.request(RadioCommand::Configure(config.clone())).await
    }

    async fn start(&self) -> Result<(), E> {
        self.request(RadioCommand::Start).await
    }

    async fn request_connect(&self) -> Result<(), E> {
        self.commands.send(RadioCommand::Connect).await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), E> {
        self.request(RadioCommand::Disconnect).await
    }
}
