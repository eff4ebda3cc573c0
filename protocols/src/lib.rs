//! Wire formats for the `bidi` probes.
//!
//! The layer writers (`ethernet`, `ip`, `tcp`, `udp`) are stitched together by
//! [`codec::HeaderStack`]. The payload builders (`dns`, `http`, `tls`, `quic`)
//! produce the bytes a probe carries.

pub mod codec;
pub mod dns;
pub mod ethernet;
pub mod http;
pub mod ip;
pub mod quic;
pub mod tcp;
pub mod tls;
pub mod udp;

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const IPV6_HDR_LEN: usize = 40;
pub const TCP_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;
