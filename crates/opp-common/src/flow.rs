//! Flow keys and minimal header extraction
//!
//! The classifier only needs the EtherType and the IPv4 source address, so
//! parsing stops as soon as those are known. Anything else is left to the
//! caller as a pass-through.

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// EtherType for IPv4
pub const ETH_P_IP: u16 = 0x0800;
/// EtherType for ARP
pub const ETH_P_ARP: u16 = 0x0806;

/// Ethernet II header length
pub const ETH_HLEN: usize = 14;
/// Fixed part of the IPv4 header
pub const IPV4_HLEN: usize = 20;

/// Why a frame could not yield a flow key
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Frame ends before the header that was being read
    #[error("truncated frame: {len} bytes, need {needed}")]
    Truncated {
        /// Bytes required to read the header
        needed: usize,
        /// Bytes available
        len: usize,
    },

    /// EtherType this instantiation does not parse
    #[error("unsupported ethertype 0x{0:04x}")]
    UnsupportedProtocol(u16),
}

/// Per-flow key: EtherType plus IPv4 source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(C)]
pub struct FlowKey {
    /// EtherType of the frame
    pub protocol: u16,
    /// Padding, kept zero so keys compare bytewise
    _pad: u16,
    /// IPv4 source address (host order)
    pub src_addr: u32,
}

impl FlowKey {
    /// Create new flow key
    #[inline(always)]
    pub const fn new(protocol: u16, src_addr: u32) -> Self {
        Self {
            protocol,
            _pad: 0,
            src_addr,
        }
    }

    /// Create from an IPv4 source
    #[inline(always)]
    pub const fn from_v4(protocol: u16, src: Ipv4Addr) -> Self {
        Self::new(protocol, u32::from_be_bytes(src.octets()))
    }

    /// Source address as `Ipv4Addr`
    #[inline(always)]
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    /// Extract the key from an Ethernet II frame.
    ///
    /// Only IPv4 is understood. ARP, IPv6 and everything else is reported as
    /// `UnsupportedProtocol`, short frames as `Truncated`.
    #[inline]
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        if frame.len() < ETH_HLEN {
            return Err(ParseError::Truncated {
                needed: ETH_HLEN,
                len: frame.len(),
            });
        }

        let ether_type = u16::from_be_bytes([frame[12], frame[13]]);

        match ether_type {
            ETH_P_IP => {
                let needed = ETH_HLEN + IPV4_HLEN;
                if frame.len() < needed {
                    return Err(ParseError::Truncated {
                        needed,
                        len: frame.len(),
                    });
                }
                let ip = &frame[ETH_HLEN..];
                let src = u32::from_be_bytes([ip[12], ip[13], ip[14], ip[15]]);
                Ok(Self::new(ether_type, src))
            }
            other => Err(ParseError::UnsupportedProtocol(other)),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/0x{:04x}", self.src_ip(), self.protocol)
    }
}

/// Build a minimal Ethernet II + IPv4 frame from `src`.
///
/// Used by the simulator, benches and tests; the result parses back to
/// `FlowKey::from_v4(ETH_P_IP, src)`.
pub fn ipv4_frame(src: Ipv4Addr, dst: Ipv4Addr) -> [u8; ETH_HLEN + IPV4_HLEN] {
    let mut frame = [0u8; ETH_HLEN + IPV4_HLEN];
    frame[12..14].copy_from_slice(&ETH_P_IP.to_be_bytes());
    // version 4, IHL 5
    frame[14] = 0x45;
    frame[16..18].copy_from_slice(&(IPV4_HLEN as u16).to_be_bytes());
    frame[22] = 64;
    frame[26..30].copy_from_slice(&src.octets());
    frame[30..34].copy_from_slice(&dst.octets());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let frame = ipv4_frame(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 1));
        let key = FlowKey::parse(&frame).unwrap();

        assert_eq!(key.protocol, ETH_P_IP);
        assert_eq!(key.src_ip(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(key, FlowKey::from_v4(ETH_P_IP, Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_parse_short_ethernet() {
        let err = FlowKey::parse(&[0u8; 10]).unwrap_err();
        assert_eq!(err, ParseError::Truncated { needed: 14, len: 10 });
    }

    #[test]
    fn test_parse_short_ipv4() {
        let frame = ipv4_frame(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        let err = FlowKey::parse(&frame[..30]).unwrap_err();
        assert_eq!(err, ParseError::Truncated { needed: 34, len: 30 });
    }

    #[test]
    fn test_parse_arp_unsupported() {
        let mut frame = [0u8; 42];
        frame[12..14].copy_from_slice(&ETH_P_ARP.to_be_bytes());
        assert_eq!(
            FlowKey::parse(&frame),
            Err(ParseError::UnsupportedProtocol(ETH_P_ARP))
        );
    }

    #[test]
    fn test_display() {
        let key = FlowKey::from_v4(ETH_P_IP, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(key.to_string(), "10.1.2.3/0x0800");
    }
}
