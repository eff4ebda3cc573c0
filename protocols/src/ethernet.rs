use pnet::packet::ethernet::{EtherType, MutableEthernetPacket};
use pnet::util::MacAddr;

use crate::codec::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetLayer {
    pub source: MacAddr,
    pub destination: MacAddr,
}

/// Writes a 14-byte Ethernet II header at the start of `buffer`.
pub fn make_header(
    buffer: &mut [u8],
    layer: &EthernetLayer,
    ethertype: EtherType,
) -> Result<(), CodecError> {
    let mut eth = MutableEthernetPacket::new(buffer).ok_or(CodecError::Buffer("ethernet"))?;

    eth.set_source(layer.source);
    eth.set_destination(layer.destination);
    eth.set_ethertype(ethertype);

    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ETH_HDR_LEN;
    use pnet::packet::ethernet::{EtherTypes, EthernetPacket};

    #[test]
    fn ethernet_header_sets_fields() {
        let mut b = vec![0u8; ETH_HDR_LEN];
        let layer = EthernetLayer {
            source: MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            destination: MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
        };

        make_header(&mut b, &layer, EtherTypes::Ipv6).unwrap();

        let eth = EthernetPacket::new(&b).expect("parse eth");
        assert_eq!(eth.get_source(), layer.source);
        assert_eq!(eth.get_destination(), layer.destination);
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv6);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut b = vec![0u8; 4];
        let layer = EthernetLayer {
            source: MacAddr::zero(),
            destination: MacAddr::zero(),
        };
        assert_eq!(
            make_header(&mut b, &layer, EtherTypes::Ipv4),
            Err(CodecError::Buffer("ethernet"))
        );
    }
}
