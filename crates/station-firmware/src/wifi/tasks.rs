//! Embassy tasks backing the WiFi station
//!
//! The radio task owns the WiFi controller; the DHCP task reports leases
//! as station events.

use embassy_futures::select::{Either, select};
use embassy_net::{Runner, Stack};
use esp_radio::wifi::{WifiController, WifiDevice, WifiEvent};
use log::{debug, info, warn};

use station_core::station::{RadioCommand, StationEvent};

use super::{WifiLink, WifiStation, mode_config};

/// Execute radio commands and report link loss.
///
/// A connect attempt that fails is reported as `Disconnected`, the same as a
/// link that drops after association, so the connection manager handles
/// both through its retry budget.
#[embassy_executor::task]
pub async fn radio_task(
    mut controller: WifiController<'static>,
    link: &'static WifiLink,
    station: &'static WifiStation,
) -> ! {
    loop {
        match select(
            link.next_command(),
            controller.wait_for_event(WifiEvent::StaDisconnected),
        )
        .await
        {
            Either::First(command) => execute(&mut controller, link, station, command).await,
            Either::Second(()) => {
                warn!("Station disconnected from the access point");
                station.publish(StationEvent::Disconnected).await;
            }
        }
    }
}

async fn execute(
    controller: &mut WifiController<'static>,
    link: &WifiLink,
    station: &WifiStation,
    command: RadioCommand,
) {
    debug!("Radio command: {:?}", command);
    match command {
        RadioCommand::Configure(config) => {
            link.reply(controller.set_config(&mode_config(&config)));
        }
        RadioCommand::Start => {
            let result = controller.start_async().await;
            let started = result.is_ok();
            link.reply(result);
            if started {
                info!("WiFi started in station mode");
                station.publish(StationEvent::Started).await;
            }
        }
        RadioCommand::Connect => match controller.connect_async().await {
            Ok(()) => info!("Associated with the access point, waiting for DHCP"),
            Err(e) => {
                warn!("Connect attempt failed: {:?}", e);
                station.publish(StationEvent::Disconnected).await;
            }
        },
        RadioCommand::Disconnect => {
            if let Err(e) = controller.disconnect_async().await {
                debug!("Disconnect before stop: {:?}", e);
            }
            let result = controller.stop_async().await;
            if result.is_ok() {
                info!("WiFi radio stopped");
            }
            link.reply(result);
        }
    }
}

/// Drive the embassy-net stack.
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Report every DHCP lease to the connection manager.
#[embassy_executor::task]
pub async fn dhcp_task(stack: Stack<'static>, station: &'static WifiStation) -> ! {
    loop {
        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            station
                .publish(StationEvent::GotAddress(config.address.address()))
                .await;
        }
        stack.wait_config_down().await;
        debug!("DHCP lease lost");
    }
}

/// Run the connection manager's event dispatcher.
#[embassy_executor::task]
pub async fn station_task(station: &'static WifiStation, link: &'static WifiLink) -> ! {
    station.run(link).await
}
