/*!
Frame splitting, decoding and encoding.

Wire format, one frame:

```text
┌──────┬────────┬────────┬─────────────┬─────────┬──────────────┬──────────┐
│ 0x3B │ LENGTH │ SOURCE │ DESTINATION │ COMMAND │ PAYLOAD      │ CHECKSUM │
│ 1B   │ 1B     │ 1B     │ 1B          │ 1B      │ LENGTH-3 B   │ 1B       │
└──────┴────────┴────────┴─────────────┴─────────┴──────────────┴──────────┘
```

The checksum is the two's-complement negation of the byte sum of everything
between the delimiter and the checksum itself. Several frames may arrive in
one transport read with no padding between them.
*/

use crate::error::{ProtocolError, Result};
use crate::protocol::{FRAME_DELIMITER, HEADER_LEN, LENGTH_OVERHEAD, MAX_PAYLOAD_LEN, MIN_FRAME_LEN};
use crate::target;
use std::fmt;
use tracing::trace;

/// Compute the AUX checksum of a byte sequence: `(!sum + 1) & 0xFF`
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

/// A decoded frame, without its leading delimiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub length: u8,
    pub source: u8,
    pub destination: u8,
    pub command: u8,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Frame {
    /// Unpack the fixed-offset header of a raw frame (delimiter already stripped).
    ///
    /// Only the size is checked here; use [`Frame::verify`] for the checksum.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::malformed(raw.len()));
        }

        let last = raw.len() - 1;
        Ok(Self {
            length: raw[0],
            source: raw[1],
            destination: raw[2],
            command: raw[3],
            payload: raw[HEADER_LEN..last].to_vec(),
            checksum: raw[last],
        })
    }

    /// Checksum the frame contents should carry
    pub fn computed_checksum(&self) -> u8 {
        let header = [self.length, self.source, self.destination, self.command];
        checksum(&header).wrapping_add(checksum(&self.payload))
    }

    /// Check the received checksum against the frame contents
    pub fn verify(&self) -> Result<()> {
        let computed = self.computed_checksum();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(ProtocolError::ChecksumMismatch {
                computed,
                received: self.checksum,
            })
        }
    }

    /// Returns true if the checksum matches
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} cmd={:#04x} data=[{}]",
            target::describe(self.source),
            target::describe(self.destination),
            self.command,
            hex::encode(&self.payload)
        )
    }
}

/// Encode one frame body (no delimiter): length, header, payload, checksum.
///
/// This is the exact inverse of [`Frame::decode`].
pub fn encode(source: u8, destination: u8, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    buf.push((payload.len() + LENGTH_OVERHEAD) as u8);
    buf.push(source);
    buf.push(destination);
    buf.push(command);
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Split a transport read into raw frames (delimiters stripped).
pub fn split_frames(buffer: &[u8]) -> FrameSplitter<'_> {
    FrameSplitter { buffer, pos: 0 }
}

/// Lazy iterator over the frames of one buffer.
///
/// Frames are anchored on the delimiter. The declared length is trusted when
/// it ends exactly at another delimiter or at the end of the buffer, which
/// keeps frames intact whose length, payload or checksum happens to be `0x3B`.
/// Otherwise the segment runs to the next delimiter. Empty segments are
/// skipped.
#[derive(Debug, Clone)]
pub struct FrameSplitter<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl FrameSplitter<'_> {
    /// End of a frame starting at `start` if its length byte lines up
    fn declared_end(&self, start: usize) -> Option<usize> {
        let end = start + self.buffer[start] as usize + 2;
        let fits = end == self.buffer.len() || self.buffer.get(end) == Some(&FRAME_DELIMITER);
        fits.then_some(end)
    }
}

impl<'a> Iterator for FrameSplitter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let buffer = self.buffer;

        loop {
            if self.pos >= buffer.len() {
                return None;
            }

            let start = if buffer[self.pos] == FRAME_DELIMITER {
                self.pos + 1
            } else {
                self.pos
            };
            if start >= buffer.len() {
                self.pos = start;
                return None;
            }

            let end = match self.declared_end(start) {
                Some(end) => end,
                // A delimiter that is not a plausible length byte closes an empty segment
                None if buffer[start] == FRAME_DELIMITER => {
                    self.pos = start;
                    continue;
                }
                None => {
                    trace!("Declared length at offset {} does not line up, splitting on delimiter", start);
                    buffer[start..]
                        .iter()
                        .position(|&b| b == FRAME_DELIMITER)
                        .map_or(buffer.len(), |offset| start + offset)
                }
            };

            self.pos = end;
            return Some(&buffer[start..end]);
        }
    }
}
