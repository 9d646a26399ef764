/*!
Discovery beacon.

Applications find the mount by listening for filler datagrams broadcast on a
well-known UDP port. The content is ignored by receivers; only the arrival
(and its source address) matters. A device stops beaconing as soon as the
first application completes the `$$$` handshake.
*/

use crate::cancel::CancelToken;
use crate::config::BeaconConfig;
use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Filler byte of the beacon payload
const BEACON_FILL: u8 = 0x00;

/// Resolved beacon parameters for one device
#[derive(Debug, Clone)]
pub struct BeaconSettings {
    /// Local address the datagrams are sent from
    pub source: SocketAddr,
    /// Broadcast destination
    pub destination: SocketAddr,
    pub interval: Duration,
    pub payload_len: usize,
}

impl BeaconSettings {
    /// Beacon from the device's own port to the configured broadcast address
    pub fn from_config(config: &BeaconConfig, source: SocketAddr) -> Result<Self> {
        Ok(Self {
            source,
            destination: SocketAddr::new(config.broadcast_ip()?, config.port),
            interval: config.interval(),
            payload_len: config.payload_len,
        })
    }
}

/// Create a non-blocking broadcast socket bound to `source`
fn bind_broadcast_socket(source: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(source), Type::DGRAM, Some(Protocol::UDP))
        .with_context(|| "Failed to create UDP socket")?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&source.into())
        .with_context(|| format!("Failed to bind beacon socket to {}", source))?;

    UdpSocket::from_std(socket.into()).with_context(|| "Failed to register beacon socket with runtime")
}

/// Broadcast one datagram per interval until the handshake or shutdown token fires
pub async fn run_beacon(settings: BeaconSettings, handshake: CancelToken, shutdown: CancelToken) -> Result<()> {
    let socket = bind_broadcast_socket(settings.source)?;
    let payload = vec![BEACON_FILL; settings.payload_len];
    let mut sent = 0u64;

    info!("📡 Beacon {} -> {} every {:?}", settings.source, settings.destination, settings.interval);

    while !handshake.is_cancelled() && !shutdown.is_cancelled() {
        match socket.send_to(&payload, settings.destination).await {
            Ok(_) => {
                sent += 1;
                debug!("Beacon datagram {} sent", sent);
            }
            Err(e) => {
                // No broadcast route is common on isolated hosts; keep trying
                warn!("Beacon send to {} failed: {}", settings.destination, e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            _ = handshake.cancelled() => {}
            _ = shutdown.cancelled() => {}
        }
    }

    info!("📡 Beacon stopped after {} datagrams", sent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_settings_from_config() {
        let config = BeaconConfig::default();
        let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2001);
        let settings = BeaconSettings::from_config(&config, source).unwrap();

        assert_eq!(settings.source.port(), 2001);
        assert_eq!(settings.destination, "255.255.255.255:55555".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.payload_len, 110);
    }

    #[tokio::test]
    async fn test_beacon_reaches_listener_and_stops_on_handshake() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let settings = BeaconSettings {
            source: "127.0.0.1:0".parse().unwrap(),
            destination: listener.local_addr().unwrap(),
            interval: Duration::from_millis(20),
            payload_len: 110,
        };

        let handshake = CancelToken::new();
        let shutdown = CancelToken::new();
        let task = tokio::spawn(run_beacon(settings, handshake.clone(), shutdown.clone()));

        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("no beacon received")
            .unwrap();
        assert_eq!(len, 110);

        handshake.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("beacon did not stop")
            .unwrap()
            .unwrap();
        assert!(!shutdown.is_cancelled());
    }
}
