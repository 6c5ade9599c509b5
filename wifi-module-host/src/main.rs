use std::{sync::Arc, time::Duration};

use log::debug;
use wifi_module_host::{Dispatcher, LinkConfig, SessionConfig, Transport, WifiSession};

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// usage: wifi-module-ctl [device] [ssid password]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let device = args.next().unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    let credentials = match (args.next(), args.next()) {
        (Some(ssid), Some(password)) => Some((ssid, password)),
        (Some(_), None) => anyhow::bail!("a password is needed to connect"),
        _ => None,
    };

    let (transport, frames) = Transport::open(&device, LinkConfig::default()).await?;
    let transport = Arc::new(transport);
    let session = Arc::new(WifiSession::new(
        transport.clone(),
        transport.sequence_counter(),
        SessionConfig::default(),
    ));

    let mut dispatcher = Dispatcher::new();
    dispatcher.register({
        let session = session.clone();
        move |frame| session.parse(frame)
    });
    let dispatch = tokio::spawn(dispatcher.run(frames));

    let res = run(&session, credentials).await;
    transport.close().await?;
    dispatch.await?;
    debug!("done");
    res
}

async fn run(
    session: &WifiSession<Arc<Transport>>,
    credentials: Option<(String, String)>,
) -> anyhow::Result<()> {
    let scan_timeout = session.config().scan_timeout;
    session.scan().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!(
        "Found: {} networks",
        session.wait_for_scan_completion(scan_timeout).await
    );
    for entry in session.drain_scan_results(scan_timeout).await {
        println!("{entry}");
    }

    let Some((ssid, password)) = credentials else {
        return Ok(());
    };
    let ip = session.ensure_connected(&ssid, &password).await?;
    println!("connected to {ssid} with {ip}");
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.disconnect().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    if session.is_connected() {
        println!("still connected to {ssid}");
    } else {
        println!("disconnected from {ssid}");
    }
    Ok(())
}
