/*!
Frame dispatch pipeline: split, verify, echo, look up, answer.

Every accepted frame is echoed back first, then the handler's reply addressed
from the original destination to the original source, then (for a handful of
commands) a bare acknowledgment. Frames that fail to decode or verify produce
no output at all.
*/

use crate::commands::{Command, Request};
use crate::mount::MountState;
use aux_protocol::command::requires_ack;
use aux_protocol::protocol::FRAME_DELIMITER;
use aux_protocol::{encode, split_frames, Frame, ProtocolError};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Append one delimited frame to `out`
fn put_frame(out: &mut BytesMut, source: u8, destination: u8, command: u8, payload: &[u8]) -> Result<(), ProtocolError> {
    let body = encode(source, destination, command, payload)?;
    out.put_u8(FRAME_DELIMITER);
    out.extend_from_slice(&body);
    Ok(())
}

/// Process one raw frame (delimiter stripped) and append the response.
///
/// Returns the handler that answered. `UnknownCommand` is reported after the
/// echo has been written; every other error leaves `out` untouched.
pub fn process_frame(mount: &mut MountState, raw: &[u8], out: &mut BytesMut) -> Result<Command, ProtocolError> {
    let frame = Frame::decode(raw)?;
    frame.verify()?;
    debug!("⬅️ {}", frame);

    let Some(command) = Command::lookup(frame.destination, frame.command) else {
        out.put_u8(FRAME_DELIMITER);
        out.extend_from_slice(raw);
        return Err(ProtocolError::UnknownCommand {
            target: frame.destination,
            command: frame.command,
        });
    };

    let request = Request {
        payload: &frame.payload,
        source: frame.source,
        destination: frame.destination,
    };
    let reply = command.execute(mount, &request);

    // Encode everything before touching `out` so a frame is answered whole or not at all
    let mut response = BytesMut::with_capacity(2 * raw.len() + reply.len() + 8);
    response.put_u8(FRAME_DELIMITER);
    response.extend_from_slice(raw);
    put_frame(&mut response, frame.destination, frame.source, frame.command, &reply)?;
    if requires_ack(frame.command) {
        put_frame(&mut response, frame.destination, frame.source, frame.command, &[])?;
    }
    out.extend_from_slice(&response);

    Ok(command)
}

/// Process every frame of one transport read, concatenating the responses
pub fn process_buffer(mount: &mut MountState, buffer: &[u8]) -> Bytes {
    let mut out = BytesMut::new();

    for raw in split_frames(buffer) {
        match process_frame(mount, raw, &mut out) {
            Ok(command) => debug!("✅ {} handled", command.name()),
            Err(e @ ProtocolError::UnknownCommand { .. }) => {
                warn!("❓ {} (echoed, no reply)", e);
            }
            Err(e) => {
                warn!("🗑️ Dropping frame [{}]: {}", hex::encode(raw), e);
            }
        }
    }

    if !out.is_empty() {
        debug!("➡️ {}", hex::encode(&out));
    }
    out.freeze()
}
