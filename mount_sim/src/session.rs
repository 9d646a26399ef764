/*!
Per-connection session state machine.

The mount's WiFi bridge starts every connection in transparent mode, where
bytes go straight to the AUX dispatcher. A `$$$` from the application switches
to a line-oriented command mode (answered `CMD`), `exit` switches back, and
any other line is acknowledged with `AOK` and the bridge version.
*/

use crate::dispatch;
use crate::mount::MountState;
use aux_protocol::ProtocolError;
use tracing::{debug, info, warn};

/// Marker that enters command mode
pub const COMMAND_MODE_MARKER: &[u8] = b"$$$";

/// Reply to the command mode marker
pub const COMMAND_MODE_REPLY: &[u8] = b"CMD\r\n";

/// Ends one line in command mode
const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Token that leaves command mode
pub const EXIT_TOKEN: &str = "exit";

/// Appended to an echoed `exit`
pub const EXIT_TRAILER: &[u8] = b"\r\nEXIT\r\n";

/// Appended to any other echoed command line, followed by the version
pub const AOK_TRAILER: &[u8] = b"\r\nAOK\r\n";

/// Version banner of the simulated bridge
pub const BRIDGE_VERSION: &str = "<2.40-CEL> ";

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, peer not yet attached
    Idle,
    /// Bytes are AUX frames
    Transparent,
    /// Bytes are ASCII bridge commands
    CommandNegotiation,
    /// Peer gone
    Closed,
}

/// What a session wants written back after one read
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub reply: Vec<u8>,
    /// Set when this read completed the `$$$` handshake
    pub handshake: bool,
}

/// State of one connected application
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    peer: String,
}

impl Session {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            state: SessionState::Idle,
            peer: peer.into(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attach the peer; the bridge starts transparent
    pub fn connect(&mut self) {
        if self.state == SessionState::Idle {
            info!("🔗 {} connected", self.peer);
            self.state = SessionState::Transparent;
        }
    }

    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!("👋 {} disconnected", self.peer);
            self.state = SessionState::Closed;
        }
    }

    /// Handle one transport read
    pub fn handle_input(&mut self, data: &[u8], mount: &mut MountState) -> SessionOutput {
        match self.state {
            SessionState::Transparent => self.handle_transparent(data, mount),
            SessionState::CommandNegotiation => self.handle_command_lines(data, mount),
            SessionState::Idle | SessionState::Closed => {
                debug!("Ignoring {} bytes from {} in state {:?}", data.len(), self.peer, self.state);
                SessionOutput::default()
            }
        }
    }

    fn handle_transparent(&mut self, data: &[u8], mount: &mut MountState) -> SessionOutput {
        if data.starts_with(COMMAND_MODE_MARKER) {
            info!("🤝 {} entered command mode", self.peer);
            self.state = SessionState::CommandNegotiation;
            return SessionOutput {
                reply: COMMAND_MODE_REPLY.to_vec(),
                handshake: true,
            };
        }

        SessionOutput {
            reply: dispatch::process_buffer(mount, data).to_vec(),
            handshake: false,
        }
    }

    /// Answer every CRLF-terminated line of a read; bytes after `exit` are frames
    fn handle_command_lines(&mut self, data: &[u8], mount: &mut MountState) -> SessionOutput {
        let mut output = SessionOutput::default();
        let mut rest = data;

        while !rest.is_empty() {
            let line_end = rest
                .windows(LINE_TERMINATOR.len())
                .position(|w| w == LINE_TERMINATOR)
                .map_or(rest.len(), |i| i + LINE_TERMINATOR.len());
            let (line, tail) = rest.split_at(line_end);
            rest = tail;

            output.reply.extend(self.handle_command_line(line));

            if self.state == SessionState::Transparent {
                if !rest.is_empty() {
                    let frames = self.handle_transparent(rest, mount);
                    output.reply.extend(frames.reply);
                    output.handshake |= frames.handshake;
                }
                break;
            }
        }

        output
    }

    fn handle_command_line(&mut self, line: &[u8]) -> Vec<u8> {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(_) => {
                warn!("{} from {}, line ignored", ProtocolError::UnsupportedEncoding, self.peer);
                return Vec::new();
            }
        };

        let mut reply = line.to_vec();
        if text.trim() == EXIT_TOKEN {
            info!("🔁 {} back to transparent mode", self.peer);
            self.state = SessionState::Transparent;
            reply.extend_from_slice(EXIT_TRAILER);
        } else {
            debug!("Bridge command from {}: {:?}", self.peer, text.trim());
            reply.extend_from_slice(AOK_TRAILER);
            reply.extend_from_slice(BRIDGE_VERSION.as_bytes());
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aux_protocol::command::motor;
    use aux_protocol::encode;
    use aux_protocol::protocol::FRAME_DELIMITER;

    fn connected() -> Session {
        let mut session = Session::new("test");
        session.connect();
        session
    }

    #[test]
    fn test_starts_idle_then_transparent() {
        let mut session = Session::new("test");
        assert_eq!(session.state(), SessionState::Idle);
        let mut mount = MountState::new();
        assert!(session.handle_input(b"$$$", &mut mount).reply.is_empty());

        session.connect();
        assert_eq!(session.state(), SessionState::Transparent);
    }

    #[test]
    fn test_negotiation_roundtrip() {
        let mut session = connected();
        let mut mount = MountState::new();

        let output = session.handle_input(b"$$$", &mut mount);
        assert_eq!(output.reply, b"CMD\r\n".to_vec());
        assert!(output.handshake);
        assert_eq!(session.state(), SessionState::CommandNegotiation);

        let output = session.handle_input(b"exit\r\n", &mut mount);
        assert_eq!(output.reply, b"exit\r\n\r\nEXIT\r\n".to_vec());
        assert!(!output.handshake);
        assert_eq!(session.state(), SessionState::Transparent);
    }

    #[test]
    fn test_other_lines_acknowledged() {
        let mut session = connected();
        let mut mount = MountState::new();
        session.handle_input(b"$$$", &mut mount);

        let output = session.handle_input(b"get everything\r\n", &mut mount);
        assert_eq!(output.reply, b"get everything\r\n\r\nAOK\r\n<2.40-CEL> ".to_vec());
        assert_eq!(session.state(), SessionState::CommandNegotiation);
    }

    #[test]
    fn test_undecodable_line_ignored() {
        let mut session = connected();
        let mut mount = MountState::new();
        session.handle_input(b"$$$", &mut mount);

        let output = session.handle_input(&[0xFF, 0xFE, b'\r', b'\n'], &mut mount);
        assert!(output.reply.is_empty());
        assert_eq!(session.state(), SessionState::CommandNegotiation);
    }

    #[test]
    fn test_each_line_of_a_read_answered() {
        let mut session = connected();
        let mut mount = MountState::new();
        session.handle_input(b"$$$", &mut mount);

        let output = session.handle_input(b"set x\r\nexit\r\n", &mut mount);
        assert_eq!(output.reply, b"set x\r\n\r\nAOK\r\n<2.40-CEL> exit\r\n\r\nEXIT\r\n".to_vec());
        assert_eq!(session.state(), SessionState::Transparent);
    }

    #[test]
    fn test_frames_after_exit_dispatched() {
        let mut session = connected();
        let mut mount = MountState::new();
        session.handle_input(b"$$$", &mut mount);

        let mut data = b"exit\r\n".to_vec();
        data.push(FRAME_DELIMITER);
        data.extend(encode(0x20, 0x10, motor::MOVE_POS, &[9]).unwrap());
        let output = session.handle_input(&data, &mut mount);

        assert!(output.reply.starts_with(b"exit\r\n\r\nEXIT\r\n"));
        assert!(mount.is_slewing());
    }

    #[test]
    fn test_frames_in_command_mode_not_dispatched() {
        let mut session = connected();
        let mut mount = MountState::new();
        session.handle_input(b"$$$", &mut mount);

        let mut frame = vec![FRAME_DELIMITER];
        frame.extend(encode(0x20, 0x10, motor::MOVE_POS, &[9]).unwrap());
        session.handle_input(&frame, &mut mount);
        assert!(!mount.is_slewing());
    }

    #[test]
    fn test_transparent_dispatches_frames() {
        let mut session = connected();
        let mut mount = MountState::new();

        let mut frame = vec![FRAME_DELIMITER];
        frame.extend(encode(0x20, 0x10, motor::MOVE_POS, &[9]).unwrap());
        let output = session.handle_input(&frame, &mut mount);

        assert!(output.reply.starts_with(&frame));
        assert!(mount.is_slewing());
    }

    #[test]
    fn test_closed_session_ignores_input() {
        let mut session = connected();
        session.close();
        let mut mount = MountState::new();
        assert_eq!(session.handle_input(b"$$$", &mut mount), SessionOutput::default());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
