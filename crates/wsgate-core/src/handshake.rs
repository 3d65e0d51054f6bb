//! Handshake frame parsing.
//!
//! Wire format of the first (and only) handshake frame on a connection:
//!
//! ```text
//! [version:1][identity:16][addons_len:1][addons:N][command:1]
//! [port:2 BE][atyp:1][address:var][payload...]
//! ```
//!
//! The server answers a successful handshake with [`acknowledgment`] once the
//! upstream connection is open; failures are never answered.

use crate::address::{read_destination, Destination};
use crate::error::{GateError, GateResult};
use crate::identity::{Identity, IDENTITY_LEN};
use crate::reader::{ByteReader, OutOfBounds};

/// Version, identity, addons length and command must all be present.
pub const MIN_FRAME_LEN: usize = 1 + IDENTITY_LEN + 1 + 1;

/// A validated connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Echoed back in the acknowledgment.
    pub version: u8,
    /// Read but not interpreted; every request is treated as a connect.
    pub command: u8,
    pub destination: Destination,
    /// Offset in the frame where client payload begins.
    pub payload_offset: usize,
    /// Client bytes that trailed the header, forwarded upstream first.
    pub payload: Vec<u8>,
}

impl ParsedRequest {
    pub fn host(&self) -> &str {
        &self.destination.host
    }

    pub fn port(&self) -> u16 {
        self.destination.port
    }
}

/// Parse the first frame of a connection against the configured identity.
pub fn parse(frame: &[u8], identity: &Identity) -> GateResult<ParsedRequest> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(GateError::Malformed(format!(
            "frame is {} bytes, need at least {MIN_FRAME_LEN}",
            frame.len()
        )));
    }

    let mut reader = ByteReader::new(frame);
    let version = reader.read_u8().map_err(malformed)?;
    let id = reader.read(IDENTITY_LEN).map_err(malformed)?;
    if !identity.matches(id) {
        return Err(GateError::InvalidIdentity(hex::encode(id)));
    }

    let addons_len = reader.read_u8().map_err(malformed)?;
    reader.skip(addons_len as usize).map_err(malformed)?;
    let command = reader.read_u8().map_err(malformed)?;

    let destination = read_destination(&mut reader)?;
    let payload_offset = reader.position();

    Ok(ParsedRequest {
        version,
        command,
        destination,
        payload_offset,
        payload: reader.rest().to_vec(),
    })
}

/// The two-byte reply sent once the upstream connection is open.
pub fn acknowledgment(version: u8) -> [u8; 2] {
    [version, 0x00]
}

fn malformed(e: OutOfBounds) -> GateError {
    GateError::Malformed(e.to_string())
}
