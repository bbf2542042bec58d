//! Encap/decap header checks against captured packets.

use crate::aft::OuterHeader;
use crate::external::DecodedPacket;
use crate::resolve::ResolutionResult;
use aft_types::IpPrefix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

/// Headers packets leaving one interface may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderExpectation {
    /// Accepted outer headers. `None` accepts a packet without a tunnel
    /// header.
    pub outer: BTreeSet<Option<OuterHeader>>,
    /// The original destination; decap and encap never rewrite it.
    pub inner_destination: IpPrefix,
}

impl HeaderExpectation {
    pub fn new(outer: Option<OuterHeader>, inner_destination: IpPrefix) -> Self {
        Self {
            outer: BTreeSet::from([outer]),
            inner_destination,
        }
    }

    /// Accepts the outer header of any egress of `result` leaving `port`.
    /// Packets on a shared port cannot be told apart by egress.
    pub fn for_port(result: &ResolutionResult, port: &str) -> Self {
        Self {
            outer: result
                .egress
                .iter()
                .filter(|egress| egress.label() == port)
                .map(|egress| egress.outer_header)
                .collect(),
            inner_destination: result.prefix,
        }
    }

    pub fn allows(&self, outer: Option<OuterHeader>) -> bool {
        self.outer.contains(&outer)
    }

    fn tunnels(&self) -> Vec<OuterHeader> {
        self.outer.iter().flatten().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mismatch", rename_all = "snake_case")]
pub enum HeaderMismatch {
    NoIpHeader { index: usize },
    MissingOuter { index: usize, expected: Vec<OuterHeader> },
    UnexpectedOuter { index: usize, found: OuterHeader },
    OuterMismatch { index: usize, expected: Vec<OuterHeader>, found: OuterHeader },
    InnerDestination { index: usize, found: IpAddr },
}

impl fmt::Display for HeaderMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderMismatch::NoIpHeader { index } => write!(f, "packet {index}: no IP header"),
            HeaderMismatch::MissingOuter { index, expected } => {
                write!(f, "packet {index}: missing outer header, want {}", one_of(expected))
            }
            HeaderMismatch::UnexpectedOuter { index, found } => {
                write!(f, "packet {index}: unexpected outer header {found}")
            }
            HeaderMismatch::OuterMismatch {
                index,
                expected,
                found,
            } => write!(f, "packet {index}: outer header {found}, want {}", one_of(expected)),
            HeaderMismatch::InnerDestination { index, found } => {
                write!(f, "packet {index}: inner destination {found} outside expected prefix")
            }
        }
    }
}

fn one_of(headers: &[OuterHeader]) -> String {
    headers.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderReport {
    pub inspected: usize,
    pub mismatches: Vec<HeaderMismatch>,
}

impl HeaderReport {
    /// An empty capture never passes.
    pub fn pass(&self) -> bool {
        self.inspected > 0 && self.mismatches.is_empty()
    }
}

impl fmt::Display for HeaderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} packets, {} mismatches",
            if self.pass() { "PASS" } else { "FAIL" },
            self.inspected,
            self.mismatches.len()
        )?;
        for mismatch in self.mismatches.iter().take(8) {
            write!(f, "\n  {mismatch}")?;
        }
        Ok(())
    }
}

pub fn validate_headers(
    packets: &[DecodedPacket],
    expectation: &HeaderExpectation,
) -> HeaderReport {
    let mut mismatches = Vec::new();
    for (index, packet) in packets.iter().enumerate() {
        let Some(inner) = packet.inner() else {
            mismatches.push(HeaderMismatch::NoIpHeader { index });
            continue;
        };
        let found = packet.outer().map(|h| h.as_outer_header());
        if !expectation.allows(found) {
            let expected = expectation.tunnels();
            mismatches.push(match found {
                None => HeaderMismatch::MissingOuter { index, expected },
                Some(found) if expected.is_empty() => {
                    HeaderMismatch::UnexpectedOuter { index, found }
                }
                Some(found) => HeaderMismatch::OuterMismatch {
                    index,
                    expected,
                    found,
                },
            });
        }
        if !expectation.inner_destination.contains(inner.dst) {
            mismatches.push(HeaderMismatch::InnerDestination {
                index,
                found: inner.dst,
            });
        }
    }
    HeaderReport {
        inspected: packets.len(),
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{EthernetHeader, IpHeader};
    use aft_types::MacAddress;

    fn eth() -> EthernetHeader {
        EthernetHeader {
            src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
            dst: MacAddress::new([0x02, 0, 0, 0, 0, 2]),
            ether_type: 0x0800,
        }
    }

    fn inner(dst: &str) -> IpHeader {
        IpHeader::new("198.51.100.1".parse().unwrap(), dst.parse().unwrap(), IpHeader::PROTO_UDP)
    }

    fn outer() -> OuterHeader {
        OuterHeader::new("198.18.0.1".parse().unwrap(), "203.0.113.100".parse().unwrap())
    }

    fn tunnel(h: OuterHeader) -> IpHeader {
        IpHeader::new(h.src, h.dst, IpHeader::PROTO_IPV4_IN_IP)
    }

    #[test]
    fn test_encapsulated_packets_match() {
        let expectation = HeaderExpectation::new(Some(outer()), "203.0.113.1/32".parse().unwrap());
        let packet = DecodedPacket::new(eth(), vec![tunnel(outer()), inner("203.0.113.1")]);
        let packets = vec![packet; 3];
        let report = validate_headers(&packets, &expectation);
        assert!(report.pass(), "{report}");
        assert_eq!(report.inspected, 3);
    }

    #[test]
    fn test_wrong_outer_and_inner_reported() {
        let expectation = HeaderExpectation::new(Some(outer()), "203.0.113.1/32".parse().unwrap());
        let other =
            OuterHeader::new("198.18.0.9".parse().unwrap(), "203.0.113.100".parse().unwrap());
        let packets = vec![
            DecodedPacket::new(eth(), vec![tunnel(other), inner("203.0.113.1")]),
            DecodedPacket::new(eth(), vec![inner("203.0.113.1")]),
            DecodedPacket::new(eth(), vec![tunnel(outer()), inner("203.0.113.7")]),
        ];
        let report = validate_headers(&packets, &expectation);
        assert!(!report.pass());
        assert!(matches!(report.mismatches[0], HeaderMismatch::OuterMismatch { index: 0, .. }));
        assert!(matches!(report.mismatches[1], HeaderMismatch::MissingOuter { index: 1, .. }));
        assert!(matches!(report.mismatches[2], HeaderMismatch::InnerDestination { index: 2, .. }));
    }

    #[test]
    fn test_decap_path_must_not_carry_tunnel() {
        let expectation = HeaderExpectation::new(None, "203.0.113.1/32".parse().unwrap());
        let packets = vec![DecodedPacket::new(eth(), vec![tunnel(outer()), inner("203.0.113.1")])];
        let report = validate_headers(&packets, &expectation);
        assert!(matches!(report.mismatches[0], HeaderMismatch::UnexpectedOuter { .. }));
    }

    #[test]
    fn test_shared_port_accepts_either_tunnel() {
        let second =
            OuterHeader::new("198.18.0.1".parse().unwrap(), "203.0.113.101".parse().unwrap());
        let mut expectation =
            HeaderExpectation::new(Some(outer()), "203.0.113.1/32".parse().unwrap());
        expectation.outer.insert(Some(second));

        let packets = vec![
            DecodedPacket::new(eth(), vec![tunnel(outer()), inner("203.0.113.1")]),
            DecodedPacket::new(eth(), vec![tunnel(second), inner("203.0.113.1")]),
            DecodedPacket::new(eth(), vec![inner("203.0.113.1")]),
        ];
        let report = validate_headers(&packets, &expectation);
        assert_eq!(report.mismatches.len(), 1, "{report}");
        assert!(matches!(
            &report.mismatches[0],
            HeaderMismatch::MissingOuter { index: 2, expected } if expected.len() == 2
        ));

        expectation.outer.insert(None);
        assert!(validate_headers(&packets, &expectation).pass());
    }

    #[test]
    fn test_empty_capture_fails() {
        let expectation = HeaderExpectation::new(None, "203.0.113.1/32".parse().unwrap());
        assert!(!validate_headers(&[], &expectation).pass());
    }
}
