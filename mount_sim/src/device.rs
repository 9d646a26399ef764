/*!
One simulated mount: its state, its listener, and its background activities.

Three activities run per device: the tick driver integrating motion, the
discovery beacon, and the TCP server with one session per connection. They
share nothing with other devices; the mount state is their only common data
and sits behind a single lock.
*/

use crate::beacon::{self, BeaconSettings};
use crate::cancel::CancelToken;
use crate::mount::MountState;
use crate::server;
use crate::status::StatusUpdate;
use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Mount state shared by the tick driver and every session of a device
pub type SharedMount = Arc<Mutex<MountState>>;

/// Everything needed to start one device
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub index: u16,
    pub listen_addr: SocketAddr,
    pub tick_interval: Duration,
    /// `None` disables the beacon
    pub beacon: Option<BeaconSettings>,
}

/// A bound, not yet running device
pub struct Device {
    settings: DeviceSettings,
    listener: TcpListener,
    mount: SharedMount,
    handshake: CancelToken,
}

impl Device {
    /// Bind the TCP listener of a device
    pub async fn bind(settings: DeviceSettings) -> Result<Self> {
        let listener = TcpListener::bind(settings.listen_addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener to {}", settings.listen_addr))?;
        info!("🔌 Mount {} listening on {}", settings.index, listener.local_addr()?);

        Ok(Self {
            settings,
            listener,
            mount: Arc::new(Mutex::new(MountState::new())),
            handshake: CancelToken::new(),
        })
    }

    pub fn with_beacon(mut self, beacon: BeaconSettings) -> Self {
        self.settings.beacon = Some(beacon);
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[cfg(test)]
    pub fn mount(&self) -> SharedMount {
        Arc::clone(&self.mount)
    }

    /// Fires once the first application completes the `$$$` handshake
    #[cfg(test)]
    pub fn handshake(&self) -> CancelToken {
        self.handshake.clone()
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancelToken, status: Option<Sender<StatusUpdate>>) -> Result<()> {
        let Device {
            settings,
            listener,
            mount,
            handshake,
        } = self;

        let tick = tokio::spawn(run_tick_driver(
            settings.index,
            Arc::clone(&mount),
            settings.tick_interval,
            status,
            shutdown.clone(),
        ));

        let beacon = settings.beacon.clone().map(|beacon_settings| {
            let handshake = handshake.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = beacon::run_beacon(beacon_settings, handshake, shutdown).await {
                    error!("Beacon failed: {:#}", e);
                }
            })
        });

        server::serve(listener, mount, handshake, shutdown).await;

        if let Err(e) = tick.await {
            warn!("Tick driver ended abnormally: {}", e);
        }
        if let Some(beacon) = beacon {
            if let Err(e) = beacon.await {
                warn!("Beacon task ended abnormally: {}", e);
            }
        }

        info!("✅ Mount {} stopped", settings.index);
        Ok(())
    }
}

/// Tick driver - integrates motion at a fixed period and publishes snapshots.
///
/// Late ticks are caught up in a burst so simulated time tracks wall-clock time.
pub async fn run_tick_driver(
    device: u16,
    mount: SharedMount,
    interval: Duration,
    status: Option<Sender<StatusUpdate>>,
    shutdown: CancelToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let seconds = interval.as_secs_f64();
    let mut ticks = 0u64;
    let mut dropped = 0u64;

    debug!("⏱️ Tick driver for mount {} every {:?}", device, interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = {
            let mut mount = mount.lock().await;
            mount.tick(seconds);
            status.as_ref().map(|_| mount.snapshot())
        };
        ticks += 1;

        if let (Some(tx), Some(snapshot)) = (status.as_ref(), snapshot) {
            match tx.try_send(StatusUpdate { device, snapshot }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Status renderer gone");
                }
            }
        }
    }

    debug!("⏱️ Tick driver for mount {} stopped after {} ticks ({} snapshots dropped)", device, ticks, dropped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{Axis, Direction};
    use aux_protocol::command::motor;
    use aux_protocol::encode;
    use aux_protocol::protocol::FRAME_DELIMITER;
    use aux_protocol::units::encode_position;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn settings() -> DeviceSettings {
        DeviceSettings {
            index: 0,
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            tick_interval: Duration::from_millis(10),
            beacon: None,
        }
    }

    async fn read_exact_len(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_tick_driver_moves_mount_and_publishes() {
        let mount: SharedMount = Arc::new(Mutex::new(MountState::new()));
        mount.lock().await.jog(Axis::Azimuth, Direction::Positive, 9);

        let (tx, rx) = crossbeam_channel::bounded(64);
        let shutdown = CancelToken::new();
        let driver = tokio::spawn(run_tick_driver(0, Arc::clone(&mount), Duration::from_millis(5), Some(tx), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        driver.await.unwrap();

        assert!(mount.lock().await.azimuth() > 0.0);
        let update = rx.try_recv().expect("no snapshot published");
        assert_eq!(update.device, 0);
        assert_eq!(update.snapshot.mode, "SLEW");
    }

    #[tokio::test]
    async fn test_session_over_tcp() {
        let device = Device::bind(settings()).await.unwrap();
        let addr = device.local_addr().unwrap();
        let handshake = device.handshake();
        let mount = device.mount();
        let shutdown = CancelToken::new();
        let running = tokio::spawn(device.run(shutdown.clone(), None));

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Negotiate and leave command mode
        client.write_all(b"$$$").await.unwrap();
        assert_eq!(read_exact_len(&mut client, 5).await, b"CMD\r\n".to_vec());
        client.write_all(b"exit\r\n").await.unwrap();
        assert_eq!(read_exact_len(&mut client, 14).await, b"exit\r\n\r\nEXIT\r\n".to_vec());
        assert!(handshake.is_cancelled());

        // Ask the altitude motor for its position
        let mut request = vec![FRAME_DELIMITER];
        request.extend(encode(0x20, 0x11, motor::GET_POSITION, &[]).unwrap());
        client.write_all(&request).await.unwrap();

        let mut expected = request.clone();
        expected.push(FRAME_DELIMITER);
        expected.extend(encode(0x11, 0x20, motor::GET_POSITION, &[0, 0, 0]).unwrap());
        assert_eq!(read_exact_len(&mut client, expected.len()).await, expected);

        // Jog, then confirm the shared mount moved
        jog(&mut client, 0x10, 9).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mount.lock().await.azimuth() > 0.0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("device did not stop")
            .unwrap()
            .unwrap();
    }

    fn wire(destination: u8, command: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![FRAME_DELIMITER];
        out.extend(encode(0x20, destination, command, payload).unwrap());
        out
    }

    /// Send a one-byte MOVE command and consume its echo, reply and ack
    async fn jog(client: &mut TcpStream, destination: u8, rate_index: u8) {
        let request = wire(destination, motor::MOVE_POS, &[rate_index]);
        client.write_all(&request).await.unwrap();
        read_exact_len(client, 3 * request.len() - 2).await;
    }

    async fn get_position(client: &mut TcpStream, destination: u8) -> [u8; 3] {
        let request = wire(destination, motor::GET_POSITION, &[]);
        client.write_all(&request).await.unwrap();
        // Echo, then delimiter + 4 header bytes + 3 payload bytes + checksum
        let response = read_exact_len(client, request.len() + 9).await;
        let payload = request.len() + 5;
        [response[payload], response[payload + 1], response[payload + 2]]
    }

    #[tokio::test]
    async fn test_connections_share_one_mount() {
        let device = Device::bind(settings()).await.unwrap();
        let addr = device.local_addr().unwrap();
        let mount = device.mount();
        let shutdown = CancelToken::new();
        let running = tokio::spawn(device.run(shutdown.clone(), None));

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();

        jog(&mut first, 0x10, 9).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        jog(&mut first, 0x10, 0).await;

        let reported = get_position(&mut second, 0x10).await;
        assert_ne!(reported, [0, 0, 0]);
        assert_eq!(reported, encode_position(mount.lock().await.azimuth()));

        shutdown.cancel();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_devices_share_nothing() {
        let moved = Device::bind(settings()).await.unwrap();
        let idle = Device::bind(DeviceSettings { index: 1, ..settings() }).await.unwrap();
        assert_ne!(moved.local_addr().unwrap(), idle.local_addr().unwrap());

        let moved_addr = moved.local_addr().unwrap();
        let idle_addr = idle.local_addr().unwrap();
        let moved_mount = moved.mount();
        let idle_mount = idle.mount();
        let shutdown = CancelToken::new();
        let first = tokio::spawn(moved.run(shutdown.clone(), None));
        let second = tokio::spawn(idle.run(shutdown.clone(), None));

        let mut client = TcpStream::connect(moved_addr).await.unwrap();
        jog(&mut client, 0x10, 9).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(moved_mount.lock().await.azimuth() > 0.0);
        {
            let idle = idle_mount.lock().await;
            assert_eq!(idle.azimuth(), 0.0);
            assert!(!idle.is_slewing());
        }

        let mut other = TcpStream::connect(idle_addr).await.unwrap();
        assert_eq!(get_position(&mut other, 0x10).await, [0, 0, 0]);

        shutdown.cancel();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }
}
