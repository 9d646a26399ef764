/*!
TCP transport for one simulated device.

Every accepted connection gets its own [`Session`]; all sessions of a device
drive the same shared mount. Each read is handled under the mount lock, so a
frame is applied completely before the tick driver can run again.
*/

use crate::cancel::CancelToken;
use crate::device::SharedMount;
use crate::session::Session;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const READ_BUFFER_SIZE: usize = 1024;

/// Accept connections until `shutdown` fires, then wait for open sessions to close
pub async fn serve(listener: TcpListener, mount: SharedMount, handshake: CancelToken, shutdown: CancelToken) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    sessions.spawn(handle_connection(
                        stream,
                        peer,
                        mount.clone(),
                        handshake.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                }
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    warn!("Session task ended abnormally: {}", e);
                }
            }
        }
    }

    info!("Closing {} open session(s)", sessions.len());
    while sessions.join_next().await.is_some() {}
}

/// Serve one application until it disconnects or the device stops
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    mount: SharedMount,
    handshake: CancelToken,
    shutdown: CancelToken,
) {
    let mut session = Session::new(peer.to_string());
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, e);
    }
    session.connect();

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = stream.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                debug!("Client {} closed connection", peer);
                break;
            }
            Ok(n) => {
                let output = {
                    let mut mount = mount.lock().await;
                    session.handle_input(&buffer[..n], &mut mount)
                };

                if output.handshake && !handshake.is_cancelled() {
                    info!("🤝 Handshake from {}, stopping beacon", peer);
                    handshake.cancel();
                }

                if !output.reply.is_empty() {
                    if let Err(e) = stream.write_all(&output.reply).await {
                        warn!("Failed to send data to {}: {}", peer, e);
                        break;
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {
                continue;
            }
            Err(e) => {
                debug!("Error reading from {}: {}", peer, e);
                break;
            }
        }
    }

    session.close();
}
