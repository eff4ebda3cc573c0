use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Key, Nonce, Tag};
use thiserror::Error;

pub const TAG_LEN: usize = 16;
pub const SAMPLE_LEN: usize = 16;
/// Header protection samples as if the packet number were always 4 bytes.
const SAMPLE_OFFSET: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtectionError {
    #[error("aead seal failed")]
    Seal,
    #[error("aead open failed: authentication tag mismatch")]
    Open,
    #[error("packet of {actual} bytes too short, header protection needs {needed}")]
    ShortPacket { needed: usize, actual: usize },
}

/// AEAD nonce: the IV XORed with the packet number, left-padded to 12 bytes.
pub fn nonce(iv: &[u8; 12], packet_number: u64) -> [u8; 12] {
    let mut nonce: [u8; 12] = *iv;
    for (byte, pn) in nonce[4..].iter_mut().zip(packet_number.to_be_bytes()) {
        *byte ^= pn;
    }
    nonce
}

/// Seals an Initial payload with AES-128-GCM. The ciphertext is as long as
/// the plaintext; the 16-byte tag is returned separately.
pub fn encrypt(
    header_aad: &[u8],
    plaintext: &[u8],
    iv: &[u8; 12],
    key: &[u8; 16],
    packet_number: u64,
) -> Result<(Vec<u8>, [u8; TAG_LEN]), ProtectionError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let nonce: [u8; 12] = nonce(iv, packet_number);

    let mut buffer: Vec<u8> = plaintext.to_vec();
    let tag: Tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), header_aad, &mut buffer)
        .map_err(|_| ProtectionError::Seal)?;

    let mut out_tag: [u8; TAG_LEN] = [0u8; TAG_LEN];
    out_tag.copy_from_slice(&tag);
    Ok((buffer, out_tag))
}

/// Opens a payload sealed by [`encrypt`].
pub fn decrypt(
    header_aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    iv: &[u8; 12],
    key: &[u8; 16],
    packet_number: u64,
) -> Result<Vec<u8>, ProtectionError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let nonce: [u8; 12] = nonce(iv, packet_number);

    let mut buffer: Vec<u8> = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(&nonce), header_aad, &mut buffer, Tag::from_slice(tag))
        .map_err(|_| ProtectionError::Open)?;
    Ok(buffer)
}

/// AES-ECB of the 16-byte sample under the header protection key.
pub fn header_protection_mask(hp: &[u8; 16], sample: &[u8; SAMPLE_LEN]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(hp));
    let mut block = GenericArray::clone_from_slice(sample);
    cipher.encrypt_block(&mut block);

    let mut mask: [u8; 16] = [0u8; 16];
    mask.copy_from_slice(&block);
    mask
}

/// Masks the first byte and the packet number of a sealed packet in place.
///
/// `pn_offset` is where the packet number starts; its length is read from the
/// still-unprotected first byte.
pub fn apply_header_protection(packet: &mut [u8], pn_offset: usize, hp: &[u8; 16]) -> Result<(), ProtectionError> {
    let first: u8 = *packet.first().ok_or(ProtectionError::ShortPacket {
        needed: 1,
        actual: 0,
    })?;
    let pn_len: usize = usize::from(first & 0x03) + 1;
    let mask: [u8; 16] = mask_for(packet, pn_offset, hp)?;

    packet[0] ^= mask[0] & first_byte_bits(first);
    for (i, m) in mask[1..=pn_len].iter().enumerate() {
        packet[pn_offset + i] ^= m;
    }
    Ok(())
}

/// Reverses [`apply_header_protection`] and returns the packet number length.
pub fn remove_header_protection(packet: &mut [u8], pn_offset: usize, hp: &[u8; 16]) -> Result<usize, ProtectionError> {
    let mask: [u8; 16] = mask_for(packet, pn_offset, hp)?;

    let bits: u8 = first_byte_bits(packet[0]);
    packet[0] ^= mask[0] & bits;
    let pn_len: usize = usize::from(packet[0] & 0x03) + 1;
    for (i, m) in mask[1..=pn_len].iter().enumerate() {
        packet[pn_offset + i] ^= m;
    }
    Ok(pn_len)
}

fn mask_for(packet: &[u8], pn_offset: usize, hp: &[u8; 16]) -> Result<[u8; 16], ProtectionError> {
    let start: usize = pn_offset + SAMPLE_OFFSET;
    let needed: usize = start + SAMPLE_LEN;
    let sample: &[u8; SAMPLE_LEN] = packet
        .get(start..needed)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtectionError::ShortPacket {
            needed,
            actual: packet.len(),
        })?;
    Ok(header_protection_mask(hp, sample))
}

/// Long headers protect the low 4 bits of the first byte, short headers 5.
fn first_byte_bits(first: u8) -> u8 {
    if first & 0x80 != 0 { 0x0f } else { 0x1f }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
