//! ## SRTLA wire format
//!
//! SRTLA multiplexes several UDP paths into one logical SRT flow. Its
//! control packets share the SRT numbering space: the first 16 bits of a
//! datagram carry a big-endian type word, and everything in the `0x9xxx`
//! range belongs to the link-aggregation layer rather than to SRT itself.
//!
//! ```bash
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Type (0x9xxx)         |        Body (type specific)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Registration carries a 256-bit group identifier: the client supplies the
//! first half in REG1 and the server completes it in its REG2 reply. The
//! remaining control packets are fixed two-byte headers, except the
//! receiver-side ACK which appends a window of observed SRT sequence
//! numbers.

pub mod srt;

/// SRTLA packet type words, fixed by the deployed ecosystem.
pub const SRTLA_TYPE_REG1: u16 = 0x9000;
pub const SRTLA_TYPE_REG2: u16 = 0x9001;
pub const SRTLA_TYPE_REG3: u16 = 0x9002;
pub const SRTLA_TYPE_REG_ERR: u16 = 0x9003;
pub const SRTLA_TYPE_REG_NGP: u16 = 0x9004;
pub const SRTLA_TYPE_KEEPALIVE: u16 = 0x9005;
pub const SRTLA_TYPE_ACK: u16 = 0x9100;

/// Full group identifier length in bytes (256 bits).
pub const SRTLA_ID_LEN: usize = 32;

pub const SRTLA_TYPE_REG1_LEN: usize = 2 + SRTLA_ID_LEN / 2;
pub const SRTLA_TYPE_REG2_LEN: usize = 2 + SRTLA_ID_LEN;
pub const SRTLA_TYPE_REG3_LEN: usize = 2;

/// Number of SRT sequence numbers batched into one SRTLA ACK.
pub const ACK_WINDOW: usize = 10;

/// SRTLA ACK: 4-byte type word followed by the sequence number window.
pub const SRTLA_TYPE_ACK_LEN: usize = 4 + 4 * ACK_WINDOW;

/// Upper bound for every per-packet buffer.
pub const MTU: usize = 1500;

/// SRTLA control packets recognized by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Reg1,
    Reg2,
    Reg3,
    RegErr,
    RegNgp,
    Keepalive,
    Ack,
}

/// Reads the big-endian type word from the start of a datagram.
///
/// # Unit Test
///
/// ```
/// assert_eq!(srtla_rec_codec::packet_type(&[0x90, 0x05]), Some(0x9005));
/// assert_eq!(srtla_rec_codec::packet_type(&[0x90]), None);
/// ```
#[inline]
pub fn packet_type(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*bytes.first()?, *bytes.get(1)?]))
}

/// Classifies a datagram as an SRTLA control packet.
///
/// REG1 and REG2 additionally require their exact wire length; a type word
/// with the wrong length is not a registration packet and falls through to
/// the data path. Anything outside the SRTLA range returns `None` and is
/// treated as opaque SRT traffic.
pub fn classify(bytes: &[u8]) -> Option<PacketKind> {
    Some(match packet_type(bytes)? {
        SRTLA_TYPE_REG1 if bytes.len() == SRTLA_TYPE_REG1_LEN => PacketKind::Reg1,
        SRTLA_TYPE_REG2 if bytes.len() == SRTLA_TYPE_REG2_LEN => PacketKind::Reg2,
        SRTLA_TYPE_REG3 => PacketKind::Reg3,
        SRTLA_TYPE_REG_ERR => PacketKind::RegErr,
        SRTLA_TYPE_REG_NGP => PacketKind::RegNgp,
        SRTLA_TYPE_KEEPALIVE => PacketKind::Keepalive,
        SRTLA_TYPE_ACK => PacketKind::Ack,
        _ => return None,
    })
}

/// The client half-identifier carried by a REG1 packet.
pub fn reg1_client_id(bytes: &[u8]) -> Option<&[u8]> {
    if classify(bytes)? == PacketKind::Reg1 {
        Some(&bytes[2..])
    } else {
        None
    }
}

/// The full group identifier carried by a REG2 packet.
pub fn reg2_group_id(bytes: &[u8]) -> Option<&[u8]> {
    if classify(bytes)? == PacketKind::Reg2 {
        Some(&bytes[2..])
    } else {
        None
    }
}

/// Encodes the REG2 reply echoing the completed group identifier.
pub fn reg2(id: &[u8; SRTLA_ID_LEN]) -> [u8; SRTLA_TYPE_REG2_LEN] {
    let mut pkt = [0u8; SRTLA_TYPE_REG2_LEN];
    pkt[0..2].copy_from_slice(&SRTLA_TYPE_REG2.to_be_bytes());
    pkt[2..].copy_from_slice(id);
    pkt
}

/// Header-only REG3 acknowledgement.
pub fn reg3() -> [u8; SRTLA_TYPE_REG3_LEN] {
    SRTLA_TYPE_REG3.to_be_bytes()
}

/// Header-only registration rejection.
pub fn reg_err() -> [u8; 2] {
    SRTLA_TYPE_REG_ERR.to_be_bytes()
}

/// Header-only "no such group" rejection.
pub fn reg_ngp() -> [u8; 2] {
    SRTLA_TYPE_REG_NGP.to_be_bytes()
}

/// Encodes a receiver-side ACK from a filled sequence number window.
///
/// The window is kept in network byte order by the caller, so the body is a
/// straight copy behind the 4-byte `(type << 16)` header.
///
/// # Unit Test
///
/// ```
/// let log = [0u8; 40];
/// let pkt = srtla_rec_codec::ack(&log);
/// assert_eq!(pkt.len(), 44);
/// assert_eq!(&pkt[0..4], &[0x91, 0x00, 0x00, 0x00]);
/// ```
pub fn ack(log: &[u8; 4 * ACK_WINDOW]) -> [u8; SRTLA_TYPE_ACK_LEN] {
    let mut pkt = [0u8; SRTLA_TYPE_ACK_LEN];
    pkt[0..4].copy_from_slice(&((SRTLA_TYPE_ACK as u32) << 16).to_be_bytes());
    pkt[4..].copy_from_slice(log);
    pkt
}
