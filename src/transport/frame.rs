//! Packet encoding and decoding.
//!
//! Every datagram starts with the 4-byte application [`Signature`] followed by
//! a one-byte [`PacketKind`]. The rest depends on the kind:
//!
//! ```text
//! +-----------+------+--------------------------------------------------+
//! | Signature | Kind | Body                                             |
//! | 4 bytes   | 1    |                                                  |
//! +-----------+------+--------------------------------------------------+
//!   ConnectRequest   token u32 | timestamp u32
//!   ConnectAccept    requester u32 | acceptor u32 | echo u32
//!   Ping             ack u32 | timestamp u32
//!   Pong             ack u32 | echo u32
//!   Ack              ack u32
//!   Unreliable       length u16 | payload
//!   Reliable         sequence u32 | ack u32 | length u16 | payload
//! ```
//!
//! All integers are big-endian. A datagram whose signature differs, whose
//! kind is unknown, or whose size disagrees with its declared length is
//! rejected; the server drops it without telling anyone.

use thiserror::Error;

use crate::core::constants::{MAX_DATAGRAM_SIZE, SIGNATURE_SIZE};

/// Size constants for the wire format.
pub mod sizes {
    use super::SIGNATURE_SIZE;

    /// Signature plus kind byte.
    pub const HEADER_SIZE: usize = SIGNATURE_SIZE + 1;
    /// Connection request.
    pub const CONNECT_REQUEST_SIZE: usize = HEADER_SIZE + 4 + 4;
    /// Connection accept.
    pub const CONNECT_ACCEPT_SIZE: usize = HEADER_SIZE + 4 + 4 + 4;
    /// Ping and pong.
    pub const PING_SIZE: usize = HEADER_SIZE + 4 + 4;
    /// Standalone acknowledgment.
    pub const ACK_SIZE: usize = HEADER_SIZE + 4;
    /// Unreliable message header (before payload).
    pub const UNRELIABLE_HEADER_SIZE: usize = HEADER_SIZE + 2;
    /// Reliable message header (before payload).
    pub const RELIABLE_HEADER_SIZE: usize = HEADER_SIZE + 4 + 4 + 2;
}

/// Largest payload accepted for an unreliable message.
pub const MAX_UNRELIABLE_PAYLOAD: usize = MAX_DATAGRAM_SIZE - sizes::UNRELIABLE_HEADER_SIZE;

/// Largest payload accepted for a reliable message.
pub const MAX_RELIABLE_PAYLOAD: usize = MAX_DATAGRAM_SIZE - sizes::RELIABLE_HEADER_SIZE;

/// Four byte tag identifying the application protocol.
///
/// Servers only talk to peers configured with the same signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create a signature from raw bytes.
    pub const fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl From<[u8; SIGNATURE_SIZE]> for Signature {
    fn from(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<u32> for Signature {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02x}{b:02x}{c:02x}{d:02x}")
    }
}

/// Packet kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Ask a peer to open a connection.
    ConnectRequest = 0x01,
    /// Confirm a connection request.
    ConnectAccept = 0x02,
    /// Liveness probe.
    Ping = 0x03,
    /// Liveness probe reply.
    Pong = 0x04,
    /// Standalone cumulative acknowledgment.
    Ack = 0x05,
    /// Best-effort application message.
    Unreliable = 0x06,
    /// Sequenced application message.
    Reliable = 0x07,
}

impl PacketKind {
    /// Parse a kind from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ConnectRequest),
            0x02 => Some(Self::ConnectAccept),
            0x03 => Some(Self::Ping),
            0x04 => Some(Self::Pong),
            0x05 => Some(Self::Ack),
            0x06 => Some(Self::Unreliable),
            0x07 => Some(Self::Reliable),
            _ => None,
        }
    }

    /// Wire byte for this kind.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded (or to-be-encoded) packet.
///
/// Payloads borrow from the datagram they were decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Connection request carrying the requester's token.
    ConnectRequest {
        /// Requester's endpoint id for this peer.
        token: u32,
        /// Requester's clock, echoed back for RTT.
        timestamp: u32,
    },
    /// Connection accept.
    ConnectAccept {
        /// Token copied from the request being accepted.
        requester: u32,
        /// Acceptor's endpoint id for the requester.
        acceptor: u32,
        /// Timestamp copied from the request.
        echo: u32,
    },
    /// Liveness probe.
    Ping {
        /// Highest contiguous reliable sequence received.
        ack: u32,
        /// Sender's clock.
        timestamp: u32,
    },
    /// Liveness probe reply.
    Pong {
        /// Highest contiguous reliable sequence received.
        ack: u32,
        /// Timestamp copied from the ping.
        echo: u32,
    },
    /// Standalone acknowledgment.
    Ack {
        /// Highest contiguous reliable sequence received.
        ack: u32,
    },
    /// Best-effort message.
    Unreliable {
        /// Application bytes.
        payload: &'a [u8],
    },
    /// Sequenced message.
    Reliable {
        /// Message sequence number.
        sequence: u32,
        /// Highest contiguous reliable sequence received.
        ack: u32,
        /// Application bytes.
        payload: &'a [u8],
    },
}

impl<'a> Packet<'a> {
    /// Kind of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::ConnectRequest { .. } => PacketKind::ConnectRequest,
            Packet::ConnectAccept { .. } => PacketKind::ConnectAccept,
            Packet::Ping { .. } => PacketKind::Ping,
            Packet::Pong { .. } => PacketKind::Pong,
            Packet::Ack { .. } => PacketKind::Ack,
            Packet::Unreliable { .. } => PacketKind::Unreliable,
            Packet::Reliable { .. } => PacketKind::Reliable,
        }
    }

    /// Cumulative acknowledgment piggybacked on this packet, if any.
    pub fn ack(&self) -> Option<u32> {
        match *self {
            Packet::Ping { ack, .. }
            | Packet::Pong { ack, .. }
            | Packet::Ack { ack }
            | Packet::Reliable { ack, .. } => Some(ack),
            _ => None,
        }
    }

    /// Application payload, for message packets.
    pub fn payload(&self) -> Option<&'a [u8]> {
        match *self {
            Packet::Unreliable { payload } | Packet::Reliable { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Number of bytes [`Packet::encode`] will write.
    pub fn encoded_len(&self) -> usize {
        match self {
            Packet::ConnectRequest { .. } => sizes::CONNECT_REQUEST_SIZE,
            Packet::ConnectAccept { .. } => sizes::CONNECT_ACCEPT_SIZE,
            Packet::Ping { .. } | Packet::Pong { .. } => sizes::PING_SIZE,
            Packet::Ack { .. } => sizes::ACK_SIZE,
            Packet::Unreliable { payload } => sizes::UNRELIABLE_HEADER_SIZE + payload.len(),
            Packet::Reliable { payload, .. } => sizes::RELIABLE_HEADER_SIZE + payload.len(),
        }
    }

    /// Encode into `buf`, replacing its contents.
    ///
    /// Payload lengths are checked by the caller against
    /// [`MAX_RELIABLE_PAYLOAD`] / [`MAX_UNRELIABLE_PAYLOAD`]; anything longer
    /// than `u16::MAX` is a programming error and is rejected here.
    pub fn encode(&self, signature: Signature, buf: &mut Vec<u8>) -> Result<(), FrameError> {
        buf.clear();
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(signature.as_bytes());
        buf.push(self.kind().as_byte());

        match *self {
            Packet::ConnectRequest { token, timestamp } => {
                buf.extend_from_slice(&token.to_be_bytes());
                buf.extend_from_slice(&timestamp.to_be_bytes());
            }
            Packet::ConnectAccept {
                requester,
                acceptor,
                echo,
            } => {
                buf.extend_from_slice(&requester.to_be_bytes());
                buf.extend_from_slice(&acceptor.to_be_bytes());
                buf.extend_from_slice(&echo.to_be_bytes());
            }
            Packet::Ping { ack, timestamp } => {
                buf.extend_from_slice(&ack.to_be_bytes());
                buf.extend_from_slice(&timestamp.to_be_bytes());
            }
            Packet::Pong { ack, echo } => {
                buf.extend_from_slice(&ack.to_be_bytes());
                buf.extend_from_slice(&echo.to_be_bytes());
            }
            Packet::Ack { ack } => {
                buf.extend_from_slice(&ack.to_be_bytes());
            }
            Packet::Unreliable { payload } => {
                buf.extend_from_slice(&payload_length(payload)?.to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Packet::Reliable {
                sequence,
                ack,
                payload,
            } => {
                buf.extend_from_slice(&sequence.to_be_bytes());
                buf.extend_from_slice(&ack.to_be_bytes());
                buf.extend_from_slice(&payload_length(payload)?.to_be_bytes());
                buf.extend_from_slice(payload);
            }
        }

        Ok(())
    }

    /// Decode a datagram, checking it carries `signature`.
    pub fn decode(signature: Signature, data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() < sizes::HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: sizes::HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[..SIGNATURE_SIZE] != signature.as_bytes()[..] {
            return Err(FrameError::SignatureMismatch);
        }

        let kind_byte = data[SIGNATURE_SIZE];
        let kind = PacketKind::from_byte(kind_byte).ok_or(FrameError::UnknownKind(kind_byte))?;
        let mut body = Reader::new(&data[sizes::HEADER_SIZE..]);

        let packet = match kind {
            PacketKind::ConnectRequest => {
                expect_size(data, sizes::CONNECT_REQUEST_SIZE)?;
                Packet::ConnectRequest {
                    token: body.u32(),
                    timestamp: body.u32(),
                }
            }
            PacketKind::ConnectAccept => {
                expect_size(data, sizes::CONNECT_ACCEPT_SIZE)?;
                Packet::ConnectAccept {
                    requester: body.u32(),
                    acceptor: body.u32(),
                    echo: body.u32(),
                }
            }
            PacketKind::Ping => {
                expect_size(data, sizes::PING_SIZE)?;
                Packet::Ping {
                    ack: body.u32(),
                    timestamp: body.u32(),
                }
            }
            PacketKind::Pong => {
                expect_size(data, sizes::PING_SIZE)?;
                Packet::Pong {
                    ack: body.u32(),
                    echo: body.u32(),
                }
            }
            PacketKind::Ack => {
                expect_size(data, sizes::ACK_SIZE)?;
                Packet::Ack { ack: body.u32() }
            }
            PacketKind::Unreliable => {
                at_least(data, sizes::UNRELIABLE_HEADER_SIZE)?;
                let length = body.u16() as usize;
                expect_length(data, sizes::UNRELIABLE_HEADER_SIZE, length)?;
                Packet::Unreliable {
                    payload: body.rest(),
                }
            }
            PacketKind::Reliable => {
                at_least(data, sizes::RELIABLE_HEADER_SIZE)?;
                let sequence = body.u32();
                let ack = body.u32();
                let length = body.u16() as usize;
                expect_length(data, sizes::RELIABLE_HEADER_SIZE, length)?;
                Packet::Reliable {
                    sequence,
                    ack,
                    payload: body.rest(),
                }
            }
        };

        Ok(packet)
    }
}

/// Errors that can occur while decoding or encoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Datagram is shorter than its fixed part.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum size for the packet kind.
        expected: usize,
        /// Received size.
        actual: usize,
    },

    /// Signature does not match this server's.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Unknown kind byte.
    #[error("unknown packet kind: 0x{0:02x}")]
    UnknownKind(u8),

    /// Declared or fixed size disagrees with the datagram size.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Size implied by the header.
        expected: usize,
        /// Received size.
        actual: usize,
    },

    /// Payload cannot be described by the 16-bit length field.
    #[error("payload of {0} bytes cannot be encoded")]
    PayloadTooLong(usize),
}

impl FrameError {
    /// Whether the datagram should be dropped without any reply.
    ///
    /// UDP ports routinely receive unrelated traffic, so nothing that fails
    /// to decode is ever answered or reported to the application.
    pub fn is_silent_drop(&self) -> bool {
        !matches!(self, FrameError::PayloadTooLong(_))
    }
}

fn payload_length(payload: &[u8]) -> Result<u16, FrameError> {
    u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLong(payload.len()))
}

fn at_least(data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() < expected {
        return Err(FrameError::TooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn expect_size(data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() != expected {
        return Err(FrameError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn expect_length(data: &[u8], header: usize, length: usize) -> Result<(), FrameError> {
    expect_size(data, header + length)
}

/// Big-endian cursor over a body whose size was already validated.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn u16(&mut self) -> u16 {
        let (head, rest) = self.data.split_at(2);
        self.data = rest;
        u16::from_be_bytes([head[0], head[1]])
    }

    fn u32(&mut self) -> u32 {
        let (head, rest) = self.data.split_at(4);
        self.data = rest;
        u32::from_be_bytes([head[0], head[1], head[2], head[3]])
    }

    fn rest(self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: Signature = Signature::new([1, 2, 3, 4]);

    fn encode(packet: Packet<'_>) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(SIG, &mut buf).unwrap();
        assert_eq!(buf.len(), packet.encoded_len());
        buf
    }

    #[test]
    fn test_packet_kind_bytes() {
        for byte in 0x01..=0x07 {
            let kind = PacketKind::from_byte(byte).unwrap();
            assert_eq!(kind.as_byte(), byte);
        }
        assert_eq!(PacketKind::from_byte(0x00), None);
        assert_eq!(PacketKind::from_byte(0x08), None);
    }

    #[test]
    fn test_connect_request_wire_format() {
        let bytes = encode(Packet::ConnectRequest {
            token: 7,
            timestamp: 0x0102_0304,
        });
        assert_eq!(hex::encode(&bytes), "01020304010000000701020304");
    }

    #[test]
    fn test_reliable_wire_format() {
        let bytes = encode(Packet::Reliable {
            sequence: 0x10,
            ack: 0x0f,
            payload: b"hi",
        });
        assert_eq!(hex::encode(&bytes), "0102030407000000100000000f00026869");
        let decoded = Packet::decode(SIG, &bytes).unwrap();
        assert_eq!(
            decoded,
            Packet::Reliable {
                sequence: 0x10,
                ack: 0x0f,
                payload: b"hi",
            }
        );
    }

    #[test]
    fn test_decode_control_packets() {
        let packets = [
            Packet::ConnectAccept {
                requester: 1,
                acceptor: 2,
                echo: 3,
            },
            Packet::Ping {
                ack: 9,
                timestamp: 100,
            },
            Packet::Pong { ack: 9, echo: 100 },
            Packet::Ack { ack: u32::MAX },
            Packet::Unreliable { payload: b"" },
        ];
        for packet in packets {
            let bytes = encode(packet);
            assert_eq!(Packet::decode(SIG, &bytes).unwrap(), packet);
        }
    }

    #[test]
    fn test_reject_foreign_signature() {
        let bytes = encode(Packet::Ack { ack: 1 });
        let other = Signature::new([4, 3, 2, 1]);
        let err = Packet::decode(other, &bytes).unwrap_err();
        assert_eq!(err, FrameError::SignatureMismatch);
        assert!(err.is_silent_drop());
    }

    #[test]
    fn test_reject_short_and_unknown() {
        assert!(matches!(
            Packet::decode(SIG, &[1, 2, 3]),
            Err(FrameError::TooShort { .. })
        ));
        assert_eq!(
            Packet::decode(SIG, &[1, 2, 3, 4, 0x42]),
            Err(FrameError::UnknownKind(0x42))
        );
    }

    #[test]
    fn test_reject_length_mismatch() {
        let mut bytes = encode(Packet::Unreliable { payload: b"hello" });

        // Truncated payload
        bytes.pop();
        assert!(matches!(
            Packet::decode(SIG, &bytes),
            Err(FrameError::LengthMismatch { .. })
        ));

        // Trailing garbage
        bytes.extend_from_slice(b"o!");
        assert!(matches!(
            Packet::decode(SIG, &bytes),
            Err(FrameError::LengthMismatch { .. })
        ));

        // Fixed-size control packet with an extra byte
        let mut ack = encode(Packet::Ack { ack: 1 });
        ack.push(0);
        assert!(matches!(
            Packet::decode(SIG, &ack),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_reject_reliable_header_truncated() {
        let bytes = encode(Packet::Reliable {
            sequence: 1,
            ack: 0,
            payload: b"x",
        });
        let truncated = &bytes[..sizes::RELIABLE_HEADER_SIZE - 1];
        assert!(matches!(
            Packet::decode(SIG, truncated),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(MAX_RELIABLE_PAYLOAD, MAX_DATAGRAM_SIZE - 15);
        assert_eq!(MAX_UNRELIABLE_PAYLOAD, MAX_DATAGRAM_SIZE - 7);

        let huge = vec![0u8; u16::MAX as usize + 1];
        let mut buf = Vec::new();
        let err = Packet::Unreliable { payload: &huge }
            .encode(SIG, &mut buf)
            .unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLong(huge.len()));
        assert!(!err.is_silent_drop());
    }

    #[test]
    fn test_ack_accessor() {
        assert_eq!(Packet::Ack { ack: 5 }.ack(), Some(5));
        assert_eq!(
            Packet::Reliable {
                sequence: 2,
                ack: 4,
                payload: b""
            }
            .ack(),
            Some(4)
        );
        assert_eq!(Packet::Unreliable { payload: b"" }.ack(), None);
        assert_eq!(
            Packet::ConnectRequest {
                token: 1,
                timestamp: 0
            }
            .ack(),
            None
        );
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(SIG.to_string(), "01020304");
        assert_eq!(Signature::from(0x0102_0304u32), SIG);
    }
}
