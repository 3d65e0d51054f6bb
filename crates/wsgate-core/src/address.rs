//! Destination decoding: 2-byte port, 1-byte address type, variable address.

use crate::error::{GateError, GateResult};
use crate::reader::{ByteReader, OutOfBounds};
use std::fmt;
use std::net::Ipv4Addr;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x02;
pub const ATYP_IPV6: u8 = 0x03;

/// Which encoding the address field used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Ipv4,
    Domain,
    Ipv6,
}

/// A connectable `(host, port)` pair decoded from a handshake frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub kind: AddressKind,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddressKind::Ipv6 => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Decode the destination starting at `offset` in `buf`.
///
/// Returns the destination and the offset of the first byte after the
/// address field. Every failure, including a truncated field, is
/// [`GateError::InvalidAddress`].
pub fn resolve(buf: &[u8], offset: usize) -> GateResult<(Destination, usize)> {
    let mut reader = ByteReader::at(buf, offset);
    let destination = read_destination(&mut reader)?;
    Ok((destination, reader.position()))
}

/// Decode the destination at the reader's position, advancing past it.
pub fn read_destination(reader: &mut ByteReader<'_>) -> GateResult<Destination> {
    let port = reader.read_u16_be().map_err(truncated("port"))?;
    let atyp = reader.read_u8().map_err(truncated("address type"))?;

    let (host, kind) = match atyp {
        ATYP_IPV4 => {
            let octets = reader.read_array::<4>().map_err(truncated("ipv4 address"))?;
            (Ipv4Addr::from(octets).to_string(), AddressKind::Ipv4)
        }
        ATYP_DOMAIN => {
            let len = reader.read_u8().map_err(truncated("domain length"))?;
            let raw = reader
                .read(len as usize)
                .map_err(truncated("domain name"))?;
            let domain = std::str::from_utf8(raw)
                .map_err(|e| GateError::InvalidAddress(format!("domain is not utf-8: {e}")))?;
            (domain.to_string(), AddressKind::Domain)
        }
        ATYP_IPV6 => {
            let raw = reader.read_array::<16>().map_err(truncated("ipv6 address"))?;
            (format_ipv6_groups(&raw), AddressKind::Ipv6)
        }
        other => {
            return Err(GateError::InvalidAddress(format!(
                "unsupported address type {other}"
            )))
        }
    };

    if host.is_empty() {
        return Err(GateError::InvalidAddress("empty host".into()));
    }
    if port == 0 {
        return Err(GateError::InvalidAddress(format!("port 0 for host {host}")));
    }

    Ok(Destination { host, port, kind })
}

/// Eight big-endian groups in lowercase hex, joined by `:`, no zero compression.
fn format_ipv6_groups(raw: &[u8; 16]) -> String {
    raw.chunks_exact(2)
        .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
        .collect::<Vec<_>>()
        .join(":")
}

fn truncated(field: &'static str) -> impl Fn(OutOfBounds) -> GateError {
    move |e| GateError::InvalidAddress(format!("truncated {field}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(port: u16, atyp: u8, addr: &[u8]) -> Vec<u8> {
        let mut buf = port.to_be_bytes().to_vec();
        buf.push(atyp);
        buf.extend_from_slice(addr);
        buf
    }

    #[test]
    fn ipv4() {
        let buf = field(443, ATYP_IPV4, &[1, 1, 1, 1]);
        let (dest, next) = resolve(&buf, 0).unwrap();
        assert_eq!(dest.host, "1.1.1.1");
        assert_eq!(dest.port, 443);
        assert_eq!(dest.kind, AddressKind::Ipv4);
        assert_eq!(next, buf.len());
        assert_eq!(dest.to_string(), "1.1.1.1:443");
    }

    #[test]
    fn domain() {
        let mut addr = vec![11u8];
        addr.extend_from_slice(b"example.com");
        let buf = field(80, ATYP_DOMAIN, &addr);
        let (dest, next) = resolve(&buf, 0).unwrap();
        assert_eq!(dest.host, "example.com");
        assert_eq!(dest.kind, AddressKind::Domain);
        assert_eq!(next, 2 + 1 + 1 + 11);
    }

    #[test]
    fn ipv6_literal_groups() {
        let mut raw = [0u8; 16];
        raw[15] = 1;
        let buf = field(8443, ATYP_IPV6, &raw);
        let (dest, _) = resolve(&buf, 0).unwrap();
        assert_eq!(dest.host, "0:0:0:0:0:0:0:1");
        assert_eq!(dest.to_string(), "[0:0:0:0:0:0:0:1]:8443");
    }

    #[test]
    fn ipv6_lowercase_hex() {
        let raw = [
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0xff, 0x00, 0x00, 0x42, 0xAB, 0xCD,
        ];
        let buf = field(1, ATYP_IPV6, &raw);
        let (dest, _) = resolve(&buf, 0).unwrap();
        assert_eq!(dest.host, "2001:db8:0:0:0:ff00:42:abcd");
    }

    #[test]
    fn resolve_honours_offset_and_leaves_payload() {
        let mut buf = vec![0xde, 0xad];
        buf.extend(field(53, ATYP_IPV4, &[8, 8, 4, 4]));
        buf.extend_from_slice(b"payload");
        let (dest, next) = resolve(&buf, 2).unwrap();
        assert_eq!(dest.to_string(), "8.8.4.4:53");
        assert_eq!(&buf[next..], b"payload");
    }

    #[test]
    fn unknown_address_types() {
        for atyp in [0u8, 4, 5, 0x7f, 0xff] {
            let buf = field(443, atyp, &[1, 2, 3, 4]);
            assert!(
                matches!(resolve(&buf, 0), Err(GateError::InvalidAddress(_))),
                "atyp {atyp} should be rejected"
            );
        }
    }

    #[test]
    fn truncated_domain() {
        let mut addr = vec![20u8];
        addr.extend_from_slice(b"short");
        let buf = field(443, ATYP_DOMAIN, &addr);
        assert!(matches!(resolve(&buf, 0), Err(GateError::InvalidAddress(_))));
    }

    #[test]
    fn truncated_fixed_width_fields() {
        assert!(matches!(resolve(&[0x01], 0), Err(GateError::InvalidAddress(_))));
        assert!(matches!(resolve(&[0x01, 0xbb], 0), Err(GateError::InvalidAddress(_))));
        let v4 = field(443, ATYP_IPV4, &[1, 2, 3]);
        assert!(matches!(resolve(&v4, 0), Err(GateError::InvalidAddress(_))));
        let v6 = field(443, ATYP_IPV6, &[0; 15]);
        assert!(matches!(resolve(&v6, 0), Err(GateError::InvalidAddress(_))));
        assert!(matches!(resolve(&v6, 100), Err(GateError::InvalidAddress(_))));
    }

    #[test]
    fn empty_domain_and_zero_port() {
        let empty = field(443, ATYP_DOMAIN, &[0]);
        assert!(matches!(resolve(&empty, 0), Err(GateError::InvalidAddress(_))));
        let zero_port = field(0, ATYP_IPV4, &[10, 0, 0, 1]);
        assert!(matches!(resolve(&zero_port, 0), Err(GateError::InvalidAddress(_))));
    }

    #[test]
    fn non_utf8_domain_rejected() {
        let buf = field(443, ATYP_DOMAIN, &[2, 0xff, 0xfe]);
        assert!(matches!(resolve(&buf, 0), Err(GateError::InvalidAddress(_))));
    }
}
