//! Classification of incoming datagrams by first byte, as per RFC 7983.
//!
//! ```text
//!              +----------------+
//!              |        [0..3] -+--> STUN (demuxed before us)
//!              |                |
//!  packet -->  |      [20..63] -+--> DTLS
//!              |                |
//!              |    [128..191] -+--> RTP/RTCP (SRTP bypass)
//!              +----------------+
//! ```

/// Length of a DTLS record header. Also the smallest datagram we treat as DTLS.
pub const DTLS_RECORD_HEADER_LEN: usize = 13;

/// Smallest datagram we treat as RTP or RTCP.
pub const MIN_RTP_PACKET_LEN: usize = 12;

/// Family of an incoming datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFamily {
    /// A DTLS record.
    Dtls,
    /// An SRTP or SRTCP packet.
    Srtp,
    /// Anything else. STUN should never get this far.
    Other,
}

impl PacketFamily {
    /// Classifies a datagram by its first byte and length.
    pub fn classify(datagram: &[u8]) -> PacketFamily {
        let Some(&byte0) = datagram.first() else {
            return PacketFamily::Other;
        };
        let len = datagram.len();

        if len >= DTLS_RECORD_HEADER_LEN && (20..=63).contains(&byte0) {
            PacketFamily::Dtls
        } else if len >= MIN_RTP_PACKET_LEN && byte0 & 0xc0 == 0x80 {
            PacketFamily::Srtp
        } else {
            PacketFamily::Other
        }
    }
}

/// Tells if the DTLS records in the datagram exactly tile it.
///
/// Protects the record engine from junk that merely looks like DTLS.
pub fn is_well_formed_dtls(datagram: &[u8]) -> bool {
    let mut rest = datagram;

    while !rest.is_empty() {
        if rest.len() < DTLS_RECORD_HEADER_LEN {
            return false;
        }

        let record_len = u16::from_be_bytes([rest[11], rest[12]]) as usize;
        let total = DTLS_RECORD_HEADER_LEN + record_len;
        if total > rest.len() {
            return false;
        }

        rest = &rest[total..];
    }

    true
}
