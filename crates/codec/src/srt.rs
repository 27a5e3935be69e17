//! Minimal SRT framing.
//!
//! The receiver never terminates SRT; it only needs three facts about a
//! datagram: whether it is long enough to be an SRT packet at all, whether
//! it is a full ACK control packet (those are fanned out to every member
//! link), and the sequence number when it is a data packet (those feed the
//! SRTLA acknowledgement window).
//!
//! ```bash
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|        (F=0: sequence number, F=1: control type and subtype) |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

/// SRT header size; anything shorter is not relayable.
pub const SRT_MIN_LEN: usize = 16;

pub const SRT_TYPE_HANDSHAKE: u16 = 0x8000;
pub const SRT_TYPE_ACK: u16 = 0x8002;

/// Induction handshake packet size: 16-byte header plus the handshake
/// control information field.
pub const SRT_HANDSHAKE_LEN: usize = 64;

/// Whether the datagram is an SRT full ACK control packet.
///
/// Control packets set the high bit of the first 32-bit word; the control
/// type lives in the remaining 15 bits of the first half-word, so the whole
/// check collapses into one type-word comparison.
#[inline]
pub fn is_ack(bytes: &[u8]) -> bool {
    crate::packet_type(bytes) == Some(SRT_TYPE_ACK)
}

/// The sequence number of an SRT data packet, or `None` for control
/// packets.
///
/// # Unit Test
///
/// ```
/// use srtla_rec_codec::srt::sequence_number;
///
/// assert_eq!(sequence_number(&42u32.to_be_bytes()), Some(42));
/// assert_eq!(sequence_number(&0x8002_0000u32.to_be_bytes()), None);
/// ```
#[inline]
pub fn sequence_number(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 {
        return None;
    }

    let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if word & 0x8000_0000 == 0 {
        Some(word)
    } else {
        None
    }
}

/// Encodes a caller-side induction handshake request.
///
/// SRT is connection oriented and ignores unsolicited datagrams, so probing
/// a server for reachability means opening a real handshake: version 4,
/// extension field 2, handshake type 1 (induction). A listening SRT server
/// answers with an induction response of the same size.
pub fn induction_request() -> [u8; SRT_HANDSHAKE_LEN] {
    let mut pkt = [0u8; SRT_HANDSHAKE_LEN];
    pkt[0..2].copy_from_slice(&SRT_TYPE_HANDSHAKE.to_be_bytes());
    // version
    pkt[16..20].copy_from_slice(&4u32.to_be_bytes());
    // encryption field stays zero, extension field advertises the magic
    pkt[22..24].copy_from_slice(&2u16.to_be_bytes());
    // handshake type: induction
    pkt[36..40].copy_from_slice(&1u32.to_be_bytes());
    pkt
}
