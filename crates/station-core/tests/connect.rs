//! End-to-end connection scenarios against a scripted radio.
//!
//! The dispatcher (`Station::run`) and the caller (`Station::connect`) run
//! concurrently on one tokio task; the radio answers each connect request
//! from a script by publishing the matching event back to the station.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Instant;

use embassy_futures::select::{Either, Either3, select, select3};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{Duration, Timer};

use station_core::config::ConnectionConfig;
use station_core::station::{
    ConnectOutcome, LinkInfo, NetInterface, Phase, RadioCommand, RadioLink, Station,
    StationDriver, StationEvent, StatusError,
};

/// Address slot shared between the fake radio and the fake interface.
#[derive(Clone, Default)]
struct FakeInterface(Rc<Cell<Option<Ipv4Addr>>>);

const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const MAC: [u8; 6] = [0x24, 0x6f, 0x28, 0x01, 0x02, 0x03];

impl NetInterface for FakeInterface {
    fn ipv4_address(&self) -> Option<Ipv4Addr> {
        self.0.get()
    }

    fn link_info(&self) -> Option<LinkInfo> {
        let address = self.0.get()?;
        let mut dns_servers = heapless::Vec::new();
        let _ = dns_servers.push(GATEWAY);
        Some(LinkInfo {
            address,
            prefix_len: 24,
            gateway: Some(GATEWAY),
            dns_servers,
            mac: Some(MAC),
        })
    }
}

type TestStation = Station<NoopRawMutex, FakeInterface>;

#[derive(Debug, Clone, Copy)]
enum Reply {
    Drop,
    Address(Ipv4Addr),
    Silent,
}

struct ScriptedRadio<'a> {
    station: &'a TestStation,
    interface: FakeInterface,
    script: RefCell<VecDeque<Reply>>,
    starts: Cell<u32>,
    connect_requests: Cell<u32>,
    disconnects: Cell<u32>,
    /// Time the radio spends on each connect request before answering.
    latency: Option<Duration>,
}

impl<'a> ScriptedRadio<'a> {
    fn new(station: &'a TestStation, interface: FakeInterface, script: &[Reply]) -> Self {
        Self {
            station,
            interface,
            script: RefCell::new(script.iter().copied().collect()),
            starts: Cell::new(0),
            connect_requests: Cell::new(0),
            disconnects: Cell::new(0),
            latency: None,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(&self, replies: &[Reply]) {
        self.script.borrow_mut().extend(replies.iter().copied());
    }
}

impl StationDriver for ScriptedRadio<'_> {
    type Error = &'static str;

    async fn configure(&self, _config: &ConnectionConfig) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn start(&self) -> Result<(), Self::Error> {
        self.starts.set(self.starts.get() + 1);
        self.station.publish(StationEvent::Started).await;
        Ok(())
    }

    async fn request_connect(&self) -> Result<(), Self::Error> {
        self.connect_requests.set(self.connect_requests.get() + 1);
        if let Some(latency) = self.latency {
            Timer::after(latency).await;
        }
        let reply = self.script.borrow_mut().pop_front().unwrap_or(Reply::Drop);
        match reply {
            Reply::Drop => self.station.publish(StationEvent::Disconnected).await,
            Reply::Address(address) => {
                self.interface.0.set(Some(address));
                self.station
                    .publish(StationEvent::GotAddress(address))
                    .await;
            }
            Reply::Silent => {}
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.disconnects.set(self.disconnects.get() + 1);
        self.interface.0.set(None);
        self.station.publish(StationEvent::Disconnected).await;
        Ok(())
    }
}

struct BrokenRadio;

impl StationDriver for BrokenRadio {
    type Error = &'static str;

    async fn configure(&self, _config: &ConnectionConfig) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn start(&self) -> Result<(), Self::Error> {
        Err("radio stuck in reset")
    }

    async fn request_connect(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn station(max_retries: u32, timeout_ms: u64) -> TestStation {
    let config = ConnectionConfig::new("home-network", "correct horse")
        .unwrap()
        .with_max_retries(max_retries)
        .with_connect_timeout(Duration::from_millis(timeout_ms))
        .unwrap();
    Station::new(config)
}

async fn connect_with_dispatcher<D: StationDriver>(
    station: &TestStation,
    driver: &D,
    interface: FakeInterface,
) -> ConnectOutcome {
    match select(station.run(driver), station.connect(driver, interface)).await {
        Either::First(never) => never,
        Either::Second(result) => result.unwrap(),
    }
}

const LEASE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

#[tokio::test]
async fn test_budget_exhausted_reports_failure() {
    let station = station(2, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(
        &station,
        interface.clone(),
        &[Reply::Drop, Reply::Drop, Reply::Drop],
    );

    let outcome = connect_with_dispatcher(&station, &radio, interface).await;

    assert_eq!(outcome, ConnectOutcome::Failure);
    assert_eq!(radio.connect_requests.get(), 3);
    assert_eq!(station.snapshot().retry_count, 2);
    assert!(!station.is_connected());
    assert_eq!(station.phase(), Phase::Failed);
    assert_eq!(station.ip_address_string(), Err(StatusError::NotConnected));
}

#[tokio::test]
async fn test_address_after_drops_reports_success() {
    let station = station(5, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(
        &station,
        interface.clone(),
        &[Reply::Drop, Reply::Drop, Reply::Drop, Reply::Address(LEASE)],
    );

    let outcome = connect_with_dispatcher(&station, &radio, interface).await;

    assert_eq!(outcome, ConnectOutcome::Success);
    assert_eq!(radio.connect_requests.get(), 4);
    let state = station.snapshot();
    assert_eq!(state.retry_count, 0);
    assert!(state.connected);
    assert_eq!(state.assigned_address, Some(LEASE));
    assert_eq!(station.ip_address_string().unwrap().as_str(), "192.168.1.42");
}

#[tokio::test]
async fn test_connect_requests_are_retries_plus_one() {
    for max_retries in 0..5 {
        let station = station(max_retries, 5_000);
        let interface = FakeInterface::default();
        let radio = ScriptedRadio::new(&station, interface.clone(), &[]);

        let outcome = connect_with_dispatcher(&station, &radio, interface).await;

        assert_eq!(outcome, ConnectOutcome::Failure);
        assert_eq!(radio.connect_requests.get(), max_retries + 1);
        assert_eq!(radio.starts.get(), 1);
    }
}

#[tokio::test]
async fn test_silent_radio_times_out() {
    let station = station(5, 100);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Silent]);

    let began = Instant::now();
    let outcome = connect_with_dispatcher(&station, &radio, interface).await;
    let elapsed = began.elapsed();

    assert_eq!(outcome, ConnectOutcome::Timeout);
    assert!(elapsed >= std::time::Duration::from_millis(100));
    assert!(elapsed < std::time::Duration::from_secs(2));
    assert!(!station.is_connected());
    assert_eq!(station.signal_bits(), 0);
}

#[tokio::test]
async fn test_late_address_after_timeout_still_connects() {
    let station = station(5, 50);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Silent]);

    let outcome = connect_with_dispatcher(&station, &radio, interface.clone()).await;
    assert_eq!(outcome, ConnectOutcome::Timeout);

    interface.0.set(Some(LEASE));
    station
        .dispatch(&radio, StationEvent::GotAddress(LEASE))
        .await;

    assert!(station.is_connected());
    assert_eq!(station.ip_address(), Some(LEASE));
}

#[tokio::test]
async fn test_reconnect_after_failure_reuses_running_radio() {
    let station = station(1, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Drop, Reply::Drop]);

    let first = connect_with_dispatcher(&station, &radio, interface.clone()).await;
    assert_eq!(first, ConnectOutcome::Failure);

    radio.push(&[Reply::Drop, Reply::Address(LEASE)]);
    let second = connect_with_dispatcher(&station, &radio, interface).await;

    assert_eq!(second, ConnectOutcome::Success);
    assert_eq!(radio.starts.get(), 1);
    // Two per attempt: the initial request plus one retry.
    assert_eq!(radio.connect_requests.get(), 4);
}

#[tokio::test]
async fn test_connect_when_connected_returns_immediately() {
    let station = station(5, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Address(LEASE)]);

    let first = connect_with_dispatcher(&station, &radio, interface.clone()).await;
    assert_eq!(first, ConnectOutcome::Success);

    let second = station.connect(&radio, interface).await.unwrap();
    assert_eq!(second, ConnectOutcome::Success);
    assert_eq!(radio.connect_requests.get(), 1);
}

#[tokio::test]
async fn test_disconnect_after_connect_keeps_stale_address() {
    let station = station(0, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Address(LEASE)]);

    assert_eq!(
        connect_with_dispatcher(&station, &radio, interface.clone()).await,
        ConnectOutcome::Success
    );

    interface.0.set(None);
    station.dispatch(&radio, StationEvent::Disconnected).await;

    let state = station.snapshot();
    assert!(!state.connected);
    assert_eq!(state.assigned_address, Some(LEASE));
    assert_eq!(station.ip_address(), None);
    assert_eq!(station.ip_address_string(), Err(StatusError::NotConnected));
}

#[tokio::test]
async fn test_connect_during_retries_joins_the_running_attempt() {
    // Three requests of 60 ms each outlast the 150 ms deadline.
    let station = station(2, 150);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[])
        .with_latency(Duration::from_millis(60));

    let caller = async {
        let first = station.connect(&radio, interface.clone()).await.unwrap();
        let phase_after_first = station.phase();
        let second = station.connect(&radio, interface.clone()).await.unwrap();
        // Anything still queued would show up as extra requests.
        Timer::after_millis(150).await;
        (first, phase_after_first, second)
    };

    let (first, phase_after_first, second) = match select(station.run(&radio), caller).await {
        Either::First(never) => never,
        Either::Second(outcomes) => outcomes,
    };

    assert_eq!(first, ConnectOutcome::Timeout);
    assert_eq!(phase_after_first, Phase::Retrying);
    assert_eq!(second, ConnectOutcome::Failure);
    assert_eq!(radio.connect_requests.get(), 3);
    assert_eq!(station.snapshot().retry_count, 2);
}

#[tokio::test]
async fn test_disconnect_stops_radio_without_retrying() {
    let station = station(3, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Address(LEASE)]);

    let caller = async {
        let first = station.connect(&radio, interface.clone()).await.unwrap();
        station.disconnect(&radio).await.unwrap();
        // Let the dispatcher drain the link loss reported by the stop.
        Timer::after_millis(20).await;
        let requests_after_stop = radio.connect_requests.get();
        let phase_after_stop = station.phase();

        radio.push(&[Reply::Address(LEASE)]);
        let second = station.connect(&radio, interface.clone()).await.unwrap();
        (first, requests_after_stop, phase_after_stop, second)
    };

    let (first, requests_after_stop, phase_after_stop, second) =
        match select(station.run(&radio), caller).await {
            Either::First(never) => never,
            Either::Second(results) => results,
        };

    assert_eq!(first, ConnectOutcome::Success);
    assert_eq!(radio.disconnects.get(), 1);
    assert_eq!(requests_after_stop, 1);
    assert_eq!(phase_after_stop, Phase::Stopped);
    assert_eq!(second, ConnectOutcome::Success);
    assert_eq!(radio.starts.get(), 2);
    assert_eq!(radio.connect_requests.get(), 2);
}

#[tokio::test]
async fn test_disconnect_before_connect_is_a_no_op() {
    let station = station(3, 5_000);
    let radio = ScriptedRadio::new(&station, FakeInterface::default(), &[]);

    station.disconnect(&radio).await.unwrap();

    assert_eq!(radio.disconnects.get(), 0);
    assert_eq!(station.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_address_without_interface_reports_no_interface() {
    let station = station(3, 5_000);
    let radio = ScriptedRadio::new(&station, FakeInterface::default(), &[]);

    station
        .dispatch(&radio, StationEvent::GotAddress(LEASE))
        .await;

    assert!(station.is_connected());
    assert_eq!(station.ip_address_string(), Err(StatusError::NoInterface));
    assert_eq!(station.link_info(), Err(StatusError::NoInterface));
}

#[tokio::test]
async fn test_interface_without_address_reports_no_address() {
    let station = station(3, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Address(LEASE)]);

    assert_eq!(
        connect_with_dispatcher(&station, &radio, interface.clone()).await,
        ConnectOutcome::Success
    );

    interface.0.set(None);

    assert!(station.is_connected());
    assert_eq!(station.ip_address_string(), Err(StatusError::NoAddress));
    assert_eq!(station.link_info(), Err(StatusError::NoAddress));
}

#[tokio::test]
async fn test_link_info_while_connected() {
    let station = station(3, 5_000);
    let interface = FakeInterface::default();
    let radio = ScriptedRadio::new(&station, interface.clone(), &[Reply::Address(LEASE)]);

    assert_eq!(station.link_info(), Err(StatusError::NotConnected));
    assert_eq!(
        connect_with_dispatcher(&station, &radio, interface).await,
        ConnectOutcome::Success
    );

    let info = station.link_info().unwrap();
    assert_eq!(info.address, LEASE);
    assert_eq!(info.netmask(), Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(info.gateway, Some(GATEWAY));
    assert_eq!(info.dns_servers.as_slice(), &[GATEWAY]);
    assert_eq!(info.mac, Some(MAC));
}

#[tokio::test]
async fn test_start_failure_is_an_error() {
    let station = station(5, 5_000);

    let result = station.connect(&BrokenRadio, FakeInterface::default()).await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("radio stuck in reset"));
}

#[tokio::test]
async fn test_radio_link_end_to_end() {
    let station = station(3, 5_000);
    let interface = FakeInterface::default();
    let link = RadioLink::<NoopRawMutex, &'static str>::new();
    let commands = RefCell::new(Vec::new());
    let mut replies = VecDeque::from([Reply::Drop, Reply::Address(LEASE)]);

    let radio_task = async {
        loop {
            let command = link.next_command().await;
            commands.borrow_mut().push(command.clone());
            match command {
                RadioCommand::Configure(_) => link.reply(Ok(())),
                RadioCommand::Start => {
                    link.reply(Ok(()));
                    station.publish(StationEvent::Started).await;
                }
                RadioCommand::Connect => match replies.pop_front() {
                    Some(Reply::Address(address)) => {
                        interface.0.set(Some(address));
                        station.publish(StationEvent::GotAddress(address)).await;
                    }
                    _ => station.publish(StationEvent::Disconnected).await,
                },
                RadioCommand::Disconnect => link.reply(Ok(())),
            }
        }
    };

    let outcome = match select3(
        station.run(&link),
        radio_task,
        station.connect(&link, interface.clone()),
    )
    .await
    {
        Either3::Third(result) => result.unwrap(),
        _ => unreachable!("dispatcher and radio task never finish"),
    };

    assert_eq!(outcome, ConnectOutcome::Success);
    let commands = commands.borrow();
    assert!(matches!(commands[0], RadioCommand::Configure(ref c) if c.ssid() == "home-network"));
    assert_eq!(
        &commands[1..],
        &[RadioCommand::Start, RadioCommand::Connect, RadioCommand::Connect]
    );
}
