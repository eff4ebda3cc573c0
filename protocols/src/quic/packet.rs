use crate::quic::keys::{KeyMaterial, MAX_CID_LEN};
use crate::quic::protect::{self, TAG_LEN};
use crate::quic::QuicError;

pub const QUIC_VERSION_1: u32 = 0x0000_0001;
/// Smallest UDP payload a client may use for a datagram carrying an Initial.
pub const MIN_INITIAL_DATAGRAM: usize = 1200;

const LONG_HEADER_INITIAL: u8 = 0xc0;
const FRAME_PADDING: u8 = 0x00;
const FRAME_CRYPTO: u8 = 0x06;
const VARINT_MAX: u64 = (1 << 62) - 1;

/// Appends a QUIC variable-length integer in its shortest form.
pub fn encode_varint(value: u64, out: &mut Vec<u8>) -> Result<(), QuicError> {
    match value {
        0..=0x3f => out.push(value as u8),
        0x40..=0x3fff => out.extend_from_slice(&(0x4000 | value as u16).to_be_bytes()),
        0x4000..=0x3fff_ffff => out.extend_from_slice(&(0x8000_0000 | value as u32).to_be_bytes()),
        0x4000_0000..=VARINT_MAX => out.extend_from_slice(&(0xc000_0000_0000_0000 | value).to_be_bytes()),
        _ => return Err(QuicError::VarintOutOfRange(value)),
    }
    Ok(())
}

/// Reads a variable-length integer, returning it with its encoded size.
pub fn decode_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let first: u8 = *buf.first()?;
    let len: usize = 1 << (first >> 6);
    let bytes: &[u8] = buf.get(..len)?;
    let value: u64 = bytes[1..]
        .iter()
        .fold(u64::from(first & 0x3f), |acc, b| (acc << 8) | u64::from(*b));
    Some((value, len))
}

/// A CRYPTO frame carrying `data` at stream offset `offset`.
pub fn crypto_frame(offset: u64, data: &[u8]) -> Result<Vec<u8>, QuicError> {
    let mut frame: Vec<u8> = Vec::with_capacity(data.len() + 9);
    frame.push(FRAME_CRYPTO);
    encode_varint(offset, &mut frame)?;
    encode_varint(data.len() as u64, &mut frame)?;
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Transport parameters a browser-like client advertises, with
/// `initial_source_connection_id` set to `scid`.
pub fn client_transport_parameters(scid: &[u8]) -> Result<Vec<u8>, QuicError> {
    const PARAMETERS: [(u64, u64); 9] = [
        (0x03, 65527),    // max_udp_payload_size
        (0x04, 10485760), // initial_max_data
        (0x05, 1048576),  // initial_max_stream_data_bidi_local
        (0x06, 1048576),  // initial_max_stream_data_bidi_remote
        (0x07, 1048576),  // initial_max_stream_data_uni
        (0x08, 10),       // initial_max_streams_bidi
        (0x09, 10),       // initial_max_streams_uni
        (0x0a, 3),        // ack_delay_exponent
        (0x0b, 25),       // max_ack_delay
    ];
    const INITIAL_SOURCE_CONNECTION_ID: u64 = 0x0f;

    let mut out: Vec<u8> = Vec::with_capacity(64);
    for (id, value) in PARAMETERS {
        let mut encoded: Vec<u8> = Vec::with_capacity(8);
        encode_varint(value, &mut encoded)?;
        encode_varint(id, &mut out)?;
        encode_varint(encoded.len() as u64, &mut out)?;
        out.extend_from_slice(&encoded);
    }
    encode_varint(INITIAL_SOURCE_CONNECTION_ID, &mut out)?;
    encode_varint(scid.len() as u64, &mut out)?;
    out.extend_from_slice(scid);
    Ok(out)
}

/// An unprotected client Initial packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPacket {
    pub dcid: Vec<u8>,
    pub scid: Vec<u8>,
    pub token: Vec<u8>,
    pub packet_number: u32,
    /// Frames, before padding and protection.
    pub payload: Vec<u8>,
}

impl InitialPacket {
    fn packet_number_len(&self) -> usize {
        match self.packet_number {
            0..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xff_ffff => 3,
            _ => 4,
        }
    }

    /// Long header up to and including the packet number, plus the offset at
    /// which the packet number starts.
    ///
    /// The Length field is always written in at least two bytes so the
    /// header size does not move when padding is added.
    pub fn header(&self, payload_len: usize) -> Result<(Vec<u8>, usize), QuicError> {
        for cid in [&self.dcid, &self.scid] {
            if cid.len() > MAX_CID_LEN {
                return Err(QuicError::ConnectionIdTooLong(cid.len()));
            }
        }
        let pn_len: usize = self.packet_number_len();
        let length: u64 = (pn_len + payload_len + TAG_LEN) as u64;

        let mut header: Vec<u8> = Vec::with_capacity(32 + self.dcid.len() + self.scid.len());
        header.push(LONG_HEADER_INITIAL | (pn_len as u8 - 1));
        header.extend_from_slice(&QUIC_VERSION_1.to_be_bytes());
        header.push(self.dcid.len() as u8);
        header.extend_from_slice(&self.dcid);
        header.push(self.scid.len() as u8);
        header.extend_from_slice(&self.scid);
        encode_varint(self.token.len() as u64, &mut header)?;
        header.extend_from_slice(&self.token);
        if length < 0x4000 {
            header.extend_from_slice(&(0x4000 | length as u16).to_be_bytes());
        } else {
            encode_varint(length, &mut header)?;
        }

        let pn_offset: usize = header.len();
        header.extend_from_slice(&self.packet_number.to_be_bytes()[4 - pn_len..]);
        Ok((header, pn_offset))
    }

    /// Appends PADDING frames so the sealed packet is at least `datagram_len`
    /// bytes long.
    pub fn pad_to(&mut self, datagram_len: usize) -> Result<(), QuicError> {
        let (header, _) = self.header(self.payload.len())?;
        let sealed_len: usize = header.len() + self.payload.len() + TAG_LEN;
        if sealed_len < datagram_len {
            self.payload.resize(self.payload.len() + datagram_len - sealed_len, FRAME_PADDING);
        }
        Ok(())
    }

    /// Seals the payload, appends the tag and applies header protection.
    pub fn protect(&self, keys: &KeyMaterial) -> Result<Vec<u8>, QuicError> {
        let (header, pn_offset) = self.header(self.payload.len())?;
        let (ciphertext, tag) = protect::encrypt(
            &header,
            &self.payload,
            &keys.iv,
            &keys.key,
            u64::from(self.packet_number),
        )?;

        let mut packet: Vec<u8> = Vec::with_capacity(header.len() + ciphertext.len() + TAG_LEN);
        packet.extend_from_slice(&header);
        packet.extend_from_slice(&ciphertext);
        packet.extend_from_slice(&tag);
        protect::apply_header_protection(&mut packet, pn_offset, &keys.hp)?;
        Ok(packet)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
