/*!
Common error types for AUX frame handling.
*/

use thiserror::Error;

/// Common result type used throughout the protocol library
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Everything that can go wrong while framing or decoding AUX traffic.
///
/// None of these are fatal: the simulator logs them and drops the offending
/// frame or line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame too short to hold a header and checksum
    #[error("Malformed frame: {len} bytes, need at least {min}")]
    MalformedFrame { len: usize, min: usize },

    /// Checksum byte does not match the frame contents
    #[error("Checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },

    /// Well-formed frame with no registered handler
    #[error("Unknown command {command:#04x} for target {target:#04x}")]
    UnknownCommand { target: u8, command: u8 },

    /// Negotiation text that is not valid ASCII/UTF-8
    #[error("Unsupported encoding in negotiation input")]
    UnsupportedEncoding,

    /// Payload cannot be described by a single length byte
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

impl ProtocolError {
    /// Create a malformed frame error for a frame of the given length
    pub fn malformed(len: usize) -> Self {
        Self::MalformedFrame {
            len,
            min: crate::protocol::MIN_FRAME_LEN,
        }
    }
}
