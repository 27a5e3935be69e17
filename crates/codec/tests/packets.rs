use srtla_rec_codec::{
    ACK_WINDOW, PacketKind, SRTLA_ID_LEN, SRTLA_TYPE_ACK_LEN, SRTLA_TYPE_REG1_LEN,
    SRTLA_TYPE_REG2_LEN, ack, classify, packet_type, reg1_client_id, reg2, reg2_group_id, reg3,
    reg_err, reg_ngp, srt,
};

fn reg1_packet(client_id: &[u8; SRTLA_ID_LEN / 2]) -> Vec<u8> {
    let mut pkt = vec![0x90, 0x00];
    pkt.extend_from_slice(client_id);
    pkt
}

#[test]
fn classify_registration_packets() {
    let client_id = [0xabu8; SRTLA_ID_LEN / 2];
    let reg1 = reg1_packet(&client_id);
    assert_eq!(reg1.len(), SRTLA_TYPE_REG1_LEN);
    assert_eq!(classify(&reg1), Some(PacketKind::Reg1));
    assert_eq!(reg1_client_id(&reg1), Some(client_id.as_slice()));

    let id = [0x5au8; SRTLA_ID_LEN];
    let reg2 = reg2(&id);
    assert_eq!(reg2.len(), SRTLA_TYPE_REG2_LEN);
    assert_eq!(classify(&reg2), Some(PacketKind::Reg2));
    assert_eq!(reg2_group_id(&reg2), Some(id.as_slice()));

    assert_eq!(classify(&reg3()), Some(PacketKind::Reg3));
    assert_eq!(classify(&reg_err()), Some(PacketKind::RegErr));
    assert_eq!(classify(&reg_ngp()), Some(PacketKind::RegNgp));
    assert_eq!(classify(&[0x90, 0x05]), Some(PacketKind::Keepalive));
}

#[test]
fn registration_length_is_enforced() {
    // A REG1 type word with a truncated identifier is not a REG1 packet.
    let mut short = reg1_packet(&[0u8; SRTLA_ID_LEN / 2]);
    short.pop();
    assert_eq!(classify(&short), None);

    // Same for an oversized REG2.
    let mut long = reg2(&[0u8; SRTLA_ID_LEN]).to_vec();
    long.push(0);
    assert_eq!(classify(&long), None);

    assert_eq!(packet_type(&[0x90]), None);
    assert_eq!(classify(&[]), None);
}

#[test]
fn keepalive_matches_on_type_alone() {
    // Senders append a timestamp to their keep-alives; the type word is
    // still the only thing that matters.
    let mut pkt = vec![0x90, 0x05];
    pkt.extend_from_slice(&123456u64.to_be_bytes());
    assert_eq!(classify(&pkt), Some(PacketKind::Keepalive));
}

#[test]
fn non_srtla_traffic_is_opaque() {
    assert_eq!(classify(&[0x80, 0x02, 0, 0]), None);
    assert_eq!(classify(&42u32.to_be_bytes()), None);
}

#[test]
fn ack_layout() {
    let mut log = [0u8; 4 * ACK_WINDOW];
    for (i, chunk) in log.chunks_exact_mut(4).enumerate() {
        chunk.copy_from_slice(&(i as u32 + 1).to_be_bytes());
    }

    let pkt = ack(&log);
    assert_eq!(pkt.len(), SRTLA_TYPE_ACK_LEN);
    assert_eq!(&pkt[0..4], &[0x91, 0x00, 0x00, 0x00]);
    assert_eq!(&pkt[4..], &log);
}

#[test]
fn srt_ack_detection() {
    let mut pkt = vec![0u8; srt::SRT_MIN_LEN];
    pkt[0..2].copy_from_slice(&srt::SRT_TYPE_ACK.to_be_bytes());
    assert!(srt::is_ack(&pkt));

    // Handshake is a control packet but not an ACK.
    pkt[0..2].copy_from_slice(&srt::SRT_TYPE_HANDSHAKE.to_be_bytes());
    assert!(!srt::is_ack(&pkt));

    // Data packets never match.
    assert!(!srt::is_ack(&7u32.to_be_bytes()));
}

#[test]
fn srt_sequence_numbers() {
    let mut pkt = vec![0u8; srt::SRT_MIN_LEN];
    pkt[0..4].copy_from_slice(&0x0102_0304u32.to_be_bytes());
    assert_eq!(srt::sequence_number(&pkt), Some(0x0102_0304));

    // The control bit disqualifies the word as a sequence number.
    pkt[0] |= 0x80;
    assert_eq!(srt::sequence_number(&pkt), None);

    assert_eq!(srt::sequence_number(&[0x00, 0x01]), None);
}

#[test]
fn induction_request_layout() {
    let pkt = srt::induction_request();
    assert_eq!(pkt.len(), srt::SRT_HANDSHAKE_LEN);
    assert_eq!(packet_type(&pkt), Some(srt::SRT_TYPE_HANDSHAKE));
    assert_eq!(&pkt[16..20], &4u32.to_be_bytes());
    assert_eq!(&pkt[22..24], &2u16.to_be_bytes());
    assert_eq!(&pkt[36..40], &1u32.to_be_bytes());
}
