/*!
# AUX Protocol

Framing, checksums and address catalog for the serial "AUX" bus spoken by
motorized telescope mounts. The same crate is used by the simulator to decode
what an application sends and to encode what the simulated subsystems answer.

## Core Types

- [`Frame`] - One decoded, addressed, checksummed message
- [`Target`] - Logical bus endpoint (motor controller, hand controller, ...)
- [`ProtocolError`] - Framing and decoding failures

## Modules

- [`frame`] - Frame splitting, decoding, encoding and checksums
- [`target`] - Target catalog
- [`command`] - Command id catalog
- [`units`] - 24-bit position and rate conversions
- [`error`] - Common error types
*/

pub mod command;
pub mod error;
pub mod frame;
pub mod target;
pub mod units;

// Re-export commonly used types
pub use error::{ProtocolError, Result};
pub use frame::{checksum, encode, split_frames, Frame, FrameSplitter};
pub use target::Target;

/// Version information for the protocol library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Byte that starts every frame on the wire
    pub const FRAME_DELIMITER: u8 = 0x3B;

    /// Header bytes following the delimiter: length, source, destination, command
    pub const HEADER_LEN: usize = 4;

    /// Smallest decodable frame: header plus checksum
    pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

    /// The length byte counts source, destination and command on top of the payload
    pub const LENGTH_OVERHEAD: usize = 3;

    /// Largest payload a single length byte can describe
    pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - LENGTH_OVERHEAD;

    /// Full rotation expressed in 24-bit position counts
    pub const POSITION_SCALE: f64 = 16_777_216.0;

    /// Guide rates travel as 1/1024 arcsec per second
    pub const GUIDE_RATE_SCALE: f64 = 1024.0;

    /// Arcseconds in one full rotation
    pub const ARCSEC_PER_ROTATION: f64 = 360.0 * 3600.0;
}
