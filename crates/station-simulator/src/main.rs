//! Desktop simulator for the WiFi station connection manager.
//!
//! Runs `station_core::station::Station` against a scripted radio so the
//! retry, failure and timeout paths can be exercised without hardware. The
//! dispatcher, the radio and the application run concurrently on one tokio
//! thread, the same way the firmware spreads them over embassy tasks.
//!
//! # Script
//!
//! Every connect request the radio receives consumes one step:
//!
//! | Step         | Radio response                  |
//! |--------------|---------------------------------|
//! | `drop`       | association fails (disconnect)  |
//! | `ip:a.b.c.d` | associates, DHCP hands out addr |
//! | `silent`     | no response at all              |
//!
//! Once the script runs out every further request is dropped.
//!
//! ```text
//! station-simulator --max-retries 2 --script drop,drop,ip:10.0.0.7
//! station-simulator --silent --timeout-ms 500
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use clap::Parser;
use embassy_futures::select::{Either, Either3, select, select3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use log::{debug, error, info, warn};

use station_core::config::{ConnectionConfig, StationSettings};
use station_core::hexdump::log_hex_dump;
use station_core::station::{
    ConnectOutcome, LinkInfo, NetInterface, RadioCommand, RadioLink, Station, StationError,
    StationEvent,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

const EXIT_FAILURE: u8 = 1;
const EXIT_TIMEOUT: u8 = 2;
const EXIT_FATAL: u8 = 3;
const EXIT_CONFIG: u8 = 4;

#[derive(Debug, Parser)]
#[command(name = "station-simulator")]
#[command(about = "Run the WiFi station connection manager against a scripted radio")]
struct Cli {
    /// JSON settings file: {"wifi": {"ssid": "...", "password": "...", ...}}.
    /// Replaces --ssid and --password.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, default_value = "sim-network")]
    ssid: String,

    #[arg(long, default_value = "sim-password")]
    password: String,

    /// Override the retry budget.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Override the connect timeout.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Comma-separated responses to successive connect requests.
    #[arg(long, value_delimiter = ',', default_value = "drop,drop,ip:192.168.4.2")]
    script: Vec<Step>,

    /// Never answer connect requests.
    #[arg(long)]
    silent: bool,

    /// Reject the radio start command.
    #[arg(long)]
    fail_start: bool,

    /// Simulated radio latency for each response.
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,

    /// Lose the link this long after every association.
    #[arg(long)]
    drop_after_ms: Option<u64>,

    /// Status polls after the connect call returns.
    #[arg(long, default_value_t = 3)]
    status_polls: u32,

    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Disconnect and stop the radio after the last status poll.
    #[arg(long)]
    disconnect: bool,
}

/// Scripted radio response to one connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Drop,
    Address(Ipv4Addr),
    Silent,
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = s.trim().to_ascii_lowercase();
        match step.as_str() {
            "drop" => Ok(Self::Drop),
            "silent" => Ok(Self::Silent),
            other => other
                .strip_prefix("ip:")
                .ok_or_else(|| format!("unknown step `{other}`, expected drop, silent or ip:a.b.c.d"))?
                .parse::<Ipv4Addr>()
                .map(Self::Address)
                .map_err(|e| format!("bad address in `{other}`: {e}")),
        }
    }
}

/// Build the connection configuration from the settings file or flags.
fn load_config(cli: &Cli) -> anyhow::Result<ConnectionConfig> {
    let mut config = match &cli.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings file {}", path.display()))?;
            let settings: StationSettings<'_> = serde_json::from_str(&text)
                .with_context(|| format!("parsing settings file {}", path.display()))?;
            ConnectionConfig::try_from(&settings.wifi)
                .map_err(|e| anyhow!("invalid settings in {}: {e}", path.display()))?
        }
        None => ConnectionConfig::new(&cli.ssid, &cli.password)
            .map_err(|e| anyhow!("invalid credentials: {e}"))?,
    };

    if let Some(max_retries) = cli.max_retries {
        config = config.with_max_retries(max_retries);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config
            .with_connect_timeout(Duration::from_millis(timeout_ms))
            .map_err(|e| anyhow!("invalid timeout: {e}"))?;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulated radio
// ---------------------------------------------------------------------------

type SimStation = Station<CriticalSectionRawMutex, SimInterface>;
type SimLink = RadioLink<CriticalSectionRawMutex, SimRadioError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimRadioError {
    NotConfigured,
    StartRejected,
}

/// Station interface whose address the simulated DHCP server controls.
#[derive(Clone, Default)]
struct SimInterface(Rc<Cell<Option<Ipv4Addr>>>);

impl SimInterface {
    fn set(&self, address: Option<Ipv4Addr>) {
        self.0.set(address);
    }
}

/// Hardware address reported by the simulated interface.
const SIM_MAC: [u8; 6] = [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01];

impl NetInterface for SimInterface {
    fn ipv4_address(&self) -> Option<Ipv4Addr> {
        self.0.get()
    }

    /// The simulated DHCP server hands out a /24 with the router at `.1`
    /// doubling as the DNS server.
    fn link_info(&self) -> Option<LinkInfo> {
        let address = self.0.get()?;
        let [a, b, c, _] = address.octets();
        let router = Ipv4Addr::new(a, b, c, 1);
        let mut dns_servers = heapless::Vec::new();
        let _ = dns_servers.push(router);
        Some(LinkInfo {
            address,
            prefix_len: 24,
            gateway: Some(router),
            dns_servers,
            mac: Some(SIM_MAC),
        })
    }
}

/// Stand-in for the firmware radio task: executes link commands and
/// answers connect requests from the script.
struct SimRadio<'a> {
    link: &'a SimLink,
    station: &'a SimStation,
    interface: SimInterface,
    script: RefCell<VecDeque<Step>>,
    silent: bool,
    fail_start: bool,
    latency: Duration,
    drop_after: Option<Duration>,
    configured: Cell<bool>,
}

impl<'a> SimRadio<'a> {
    fn new(cli: &Cli, link: &'a SimLink, station: &'a SimStation, interface: SimInterface) -> Self {
        Self {
            link,
            station,
            interface,
            script: RefCell::new(cli.script.iter().copied().collect()),
            silent: cli.silent,
            fail_start: cli.fail_start,
            latency: Duration::from_millis(cli.latency_ms),
            drop_after: cli.drop_after_ms.map(Duration::from_millis),
            configured: Cell::new(false),
        }
    }

    async fn run(&self) -> ! {
        let mut associated = false;
        loop {
            let drop_after = self.drop_after;
            let link_loss = async move {
                match drop_after {
                    Some(after) if associated => Timer::after(after).await,
                    _ => core::future::pending::<()>().await,
                }
            };

            match select(self.link.next_command(), link_loss).await {
                Either::First(command) => {
                    if let Some(now_associated) = self.execute(command).await {
                        associated = now_associated;
                    }
                }
                Either::Second(()) => {
                    warn!("[radio] link lost");
                    associated = false;
                    self.interface.set(None);
                    self.station.publish(StationEvent::Disconnected).await;
                }
            }
        }
    }

    /// Execute one command. Returns the new association state when a
    /// connect request settled it.
    async fn execute(&self, command: RadioCommand) -> Option<bool> {
        debug!("[radio] {:?}", command);
        match command {
            RadioCommand::Configure(config) => {
                info!(
                    "[radio] station mode, SSID {} ({})",
                    config.ssid(),
                    config.auth_mode().label()
                );
                self.configured.set(true);
                self.link.reply(Ok(()));
                None
            }
            RadioCommand::Start => {
                if self.fail_start {
                    self.link.reply(Err(SimRadioError::StartRejected));
                } else if !self.configured.get() {
                    self.link.reply(Err(SimRadioError::NotConfigured));
                } else {
                    self.link.reply(Ok(()));
                    Timer::after(self.latency).await;
                    info!("[radio] started");
                    self.station.publish(StationEvent::Started).await;
                }
                None
            }
            RadioCommand::Connect => {
                Timer::after(self.latency).await;
                let step = if self.silent {
                    Step::Silent
                } else {
                    self.script.borrow_mut().pop_front().unwrap_or(Step::Drop)
                };
                match step {
                    Step::Drop => {
                        info!("[radio] association failed");
                        self.station.publish(StationEvent::Disconnected).await;
                        Some(false)
                    }
                    Step::Address(address) => {
                        info!("[radio] associated, DHCP lease {}", address);
                        log_hex_dump(Some("lease"), &address.octets());
                        self.interface.set(Some(address));
                        self.station
                            .publish(StationEvent::GotAddress(address))
                            .await;
                        Some(true)
                    }
                    Step::Silent => {
                        info!("[radio] no response");
                        None
                    }
                }
            }
            RadioCommand::Disconnect => {
                info!("[radio] disconnected and stopped");
                self.interface.set(None);
                self.link.reply(Ok(()));
                self.station.publish(StationEvent::Disconnected).await;
                Some(false)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Connect, then poll status the way the firmware example does.
async fn application(
    cli: &Cli,
    station: &SimStation,
    link: &SimLink,
    interface: SimInterface,
) -> Result<ConnectOutcome, StationError> {
    let outcome = station.connect(link, interface).await?;

    match outcome {
        ConnectOutcome::Success => match station.ip_address_string() {
            Ok(ip) => info!("WiFi connected successfully, IP: {}", ip),
            Err(e) => warn!("WiFi connected but the address is unavailable: {}", e),
        },
        other => error!("Failed to connect to WiFi: {}", other.label()),
    }

    for _ in 0..cli.status_polls {
        Timer::after(Duration::from_millis(cli.poll_interval_ms)).await;
        station.log_status();
    }

    if cli.disconnect {
        station.disconnect(link).await?;
    }

    Ok(outcome)
}

/// Run dispatcher, radio and application until the application finishes.
async fn simulate(cli: &Cli, config: ConnectionConfig) -> Result<ConnectOutcome, StationError> {
    let station = SimStation::new(config);
    let link = SimLink::new();
    let interface = SimInterface::default();
    let radio = SimRadio::new(cli, &link, &station, interface.clone());

    match select3(
        station.run(&link),
        radio.run(),
        application(cli, &station, &link, interface),
    )
    .await
    {
        Either3::First(never) | Either3::Second(never) => never,
        Either3::Third(result) => result,
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    info!("Starting station simulator");
    info!(
        "SSID {} | auth {} | max retries {} | timeout {} ms",
        config.ssid(),
        config.auth_mode().label(),
        config.max_retries(),
        config.connect_timeout().as_millis()
    );

    let code = match simulate(&cli, config).await {
        Ok(ConnectOutcome::Success) => ExitCode::SUCCESS,
        Ok(ConnectOutcome::Failure) => ExitCode::from(EXIT_FAILURE),
        Ok(ConnectOutcome::Timeout) => ExitCode::from(EXIT_TIMEOUT),
        Err(e) => {
            error!("Fatal radio error: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    };

    info!("Simulator exiting");
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["station-simulator", "--latency-ms", "0", "--status-polls", "0"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!("drop".parse::<Step>(), Ok(Step::Drop));
        assert_eq!(" Silent ".parse::<Step>(), Ok(Step::Silent));
        assert_eq!(
            "ip:10.0.0.7".parse::<Step>(),
            Ok(Step::Address(Ipv4Addr::new(10, 0, 0, 7)))
        );
        assert!("ip:10.0.0".parse::<Step>().is_err());
        assert!("reboot".parse::<Step>().is_err());
    }

    #[test]
    fn test_cli_script_and_overrides() {
        let cli = cli(&["--script", "drop,ip:10.0.0.7", "--max-retries", "1"]);
        assert_eq!(
            cli.script,
            vec![Step::Drop, Step::Address(Ipv4Addr::new(10, 0, 0, 7))]
        );
        let config = load_config(&cli).unwrap();
        assert_eq!(config.max_retries(), 1);
        assert_eq!(config.ssid(), "sim-network");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(load_config(&cli(&["--timeout-ms", "0"])).is_err());
    }

    #[test]
    fn test_settings_file() {
        let path = std::env::temp_dir().join(format!(
            "station-simulator-settings-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"wifi":{"ssid":"lab","password":"secret","auth_mode":"Wpa3Personal","max_retries":7}}"#,
        )
        .unwrap();

        let cli = cli(&["--settings", path.to_str().unwrap()]);
        let config = load_config(&cli).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.ssid(), "lab");
        assert_eq!(config.max_retries(), 7);
        assert_eq!(config.auth_mode().label(), "WPA3_PSK");
    }

    #[tokio::test]
    async fn test_default_script_connects() {
        let cli = cli(&[]);
        let config = load_config(&cli).unwrap();
        assert_eq!(simulate(&cli, config).await, Ok(ConnectOutcome::Success));
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails() {
        let cli = cli(&["--script", "drop,drop,drop,ip:10.0.0.7", "--max-retries", "2"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(simulate(&cli, config).await, Ok(ConnectOutcome::Failure));
    }

    #[tokio::test]
    async fn test_silent_radio_times_out() {
        let cli = cli(&["--silent", "--timeout-ms", "100"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(simulate(&cli, config).await, Ok(ConnectOutcome::Timeout));
    }

    #[tokio::test]
    async fn test_disconnect_after_connect() {
        let cli = cli(&["--script", "ip:10.0.0.7", "--disconnect"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(simulate(&cli, config).await, Ok(ConnectOutcome::Success));
    }

    #[test]
    fn test_interface_reports_router_lease() {
        let interface = SimInterface::default();
        assert_eq!(interface.link_info(), None);

        interface.set(Some(Ipv4Addr::new(10, 0, 0, 7)));
        let info = interface.link_info().unwrap();
        assert_eq!(info.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(info.dns_servers.as_slice(), &[Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(info.netmask(), Ipv4Addr::new(255, 255, 255, 0));
    }

    #[tokio::test]
    async fn test_start_rejection_is_fatal() {
        let cli = cli(&["--fail-start"]);
        let config = load_config(&cli).unwrap();
        assert!(matches!(
            simulate(&cli, config).await,
            Err(StationError::Start(_))
        ));
    }
}
