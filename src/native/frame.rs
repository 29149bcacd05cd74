//! WebSocket frame codec, client role.
//!
//! https://datatracker.ietf.org/doc/html/rfc6455#section-5.2
//!
//! Client-to-server frames must be masked; server-to-client frames must not
//! be. The decoder tolerates masked input anyway and unmasks it, since being
//! liberal here costs one xor pass.

use crate::error::Error;

/// Sanity cap on a single message. Anything larger is treated as a corrupt
/// stream rather than a legitimate payload.
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
pub(crate) const OP_BINARY: u8 = 0x2;
pub(crate) const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

const FIN: u8 = 0b1000_0000;
const MASK: u8 = 0b1000_0000;

/// Encodes one unfragmented binary frame, masked with `mask`.
pub(crate) fn encode_binary(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    encode(OP_BINARY, payload, Some(mask))
}

/// Encodes a close frame (empty payload), masked with `mask`.
pub(crate) fn encode_close(mask: [u8; 4]) -> Vec<u8> {
    encode(OP_CLOSE, &[], Some(mask))
}

/// Encodes a pong frame echoing `payload`, masked with `mask`.
pub(crate) fn encode_pong(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    encode(OP_PONG, payload, Some(mask))
}

pub(crate) fn encode(opcode: u8, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FIN | opcode);
    let mask_bit = if mask.is_some() { MASK } else { 0 };
    if payload.len() <= 125 {
        frame.push(payload.len() as u8 | mask_bit);
    } else if payload.len() <= 65535 {
        frame.push(126 | mask_bit);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        frame.push(127 | mask_bit);
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }
    match mask {
        Some(key) => {
            frame.extend_from_slice(&key);
            let start = frame.len();
            frame.extend_from_slice(payload);
            for (i, byte) in frame[start..].iter_mut().enumerate() {
                *byte ^= key[i % 4];
            }
        }
        None => frame.extend_from_slice(payload),
    }
    frame
}

/// One complete unit decoded from the stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Incoming {
    /// A complete text or binary message, continuation frames reassembled.
    Message(Vec<u8>),
    /// A ping; the reader must answer with a pong carrying the same payload.
    Ping(Vec<u8>),
    /// A pong (unsolicited or answering our ping). Ignorable.
    Pong(Vec<u8>),
    /// The peer started the closing handshake.
    Close,
}

/// Incremental frame decoder.
///
/// Feed raw bytes with [`push`](Self::push) as they arrive, then call
/// [`next`](Self::next) until it yields `Ok(None)`. Partial frames stay
/// buffered across calls.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    unparsed: Vec<u8>,
    /// Reassembly buffer for a fragmented message.
    message: Vec<u8>,
    in_message: bool,
}

impl FrameDecoder {
    pub(crate) fn new() -> Self {
        FrameDecoder::default()
    }

    pub(crate) fn push(&mut self, data: &[u8]) {
        self.unparsed.extend_from_slice(data);
    }

    /// Decodes the next complete unit, or `Ok(None)` if more bytes are
    /// needed.
    pub(crate) fn next(&mut self) -> Result<Option<Incoming>, Error> {
        loop {
            if self.unparsed.len() < 2 {
                return Ok(None);
            }
            let is_fin = self.unparsed[0] & FIN != 0;
            let opcode = self.unparsed[0] & 0b0000_1111;

            let payload_length = self.unparsed[1] & 0b0111_1111;
            let masked = self.unparsed[1] & MASK != 0;
            let mask_begin;
            let len;
            if payload_length < 126 {
                len = payload_length as usize;
                mask_begin = 2;
            } else if payload_length == 126 {
                if self.unparsed.len() < 4 {
                    return Ok(None);
                }
                len = u16::from_be_bytes(self.unparsed[2..4].try_into().unwrap()) as usize;
                mask_begin = 4;
            } else {
                if self.unparsed.len() < 10 {
                    return Ok(None);
                }
                len = u64::from_be_bytes(self.unparsed[2..10].try_into().unwrap()) as usize;
                mask_begin = 10;
            }
            if len > MAX_MESSAGE_LEN || self.message.len() + len > MAX_MESSAGE_LEN {
                return Err(Error::Message(format!(
                    "frame of {} bytes exceeds the {} byte cap; treating stream as corrupt",
                    len, MAX_MESSAGE_LEN
                )));
            }

            let mask_bytes = if masked { 4 } else { 0 };
            let data_begin = mask_begin + mask_bytes;
            if self.unparsed.len() < data_begin + len {
                return Ok(None);
            }

            let mut payload = self.unparsed[data_begin..data_begin + len].to_vec();
            if masked {
                let key: [u8; 4] = self.unparsed[mask_begin..mask_begin + 4]
                    .try_into()
                    .unwrap();
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= key[i % 4];
                }
            }
            self.unparsed.drain(0..data_begin + len);

            match opcode {
                OP_CLOSE => return Ok(Some(Incoming::Close)),
                OP_PING => return Ok(Some(Incoming::Ping(payload))),
                OP_PONG => return Ok(Some(Incoming::Pong(payload))),
                OP_TEXT | OP_BINARY => {
                    if self.in_message {
                        return Err(Error::Message(
                            "new data frame arrived mid-fragmented-message".to_string(),
                        ));
                    }
                    if is_fin {
                        return Ok(Some(Incoming::Message(payload)));
                    }
                    self.message = payload;
                    self.in_message = true;
                    // keep going; the rest of the message may be buffered
                }
                OP_CONTINUATION => {
                    if !self.in_message {
                        return Err(Error::Message(
                            "continuation frame without a message in progress".to_string(),
                        ));
                    }
                    self.message.extend_from_slice(&payload);
                    if is_fin {
                        self.in_message = false;
                        return Ok(Some(Incoming::Message(std::mem::take(&mut self.message))));
                    }
                }
                other => {
                    return Err(Error::Unsupported(format!(
                        "websocket opcode {:#x}",
                        other
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0xA1, 0xB2, 0xC3, 0xD4];

    /// Builds an unmasked server-side frame, the shape we decode in practice.
    fn server_frame(opcode: u8, fin: bool, payload: &[u8]) -> Vec<u8> {
        let mut frame = encode(opcode, payload, None);
        if !fin {
            frame[0] &= !FIN;
        }
        frame
    }

    #[test]
    fn encode_small_masked_frame() {
        let frame = encode_binary(b"abc", KEY);
        assert_eq!(frame[0], FIN | OP_BINARY);
        assert_eq!(frame[1], 3 | MASK);
        assert_eq!(&frame[2..6], &KEY);
        let unmasked: Vec<u8> = frame[6..]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ KEY[i % 4])
            .collect();
        assert_eq!(unmasked, b"abc");
    }

    #[test]
    fn encode_uses_extended_length_tiers() {
        let medium = encode_binary(&vec![0u8; 300], KEY);
        assert_eq!(medium[1] & 0b0111_1111, 126);
        assert_eq!(u16::from_be_bytes(medium[2..4].try_into().unwrap()), 300);

        let large = encode_binary(&vec![0u8; 70_000], KEY);
        assert_eq!(large[1] & 0b0111_1111, 127);
        assert_eq!(u64::from_be_bytes(large[2..10].try_into().unwrap()), 70_000);
    }

    #[test]
    fn decode_unmasked_server_message() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(OP_BINARY, true, b"hello"));
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"hello".to_vec()))
        );
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn decode_masked_frame_round_trips_the_encoder() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_binary(b"round trip", KEY));
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"round trip".to_vec()))
        );
    }

    #[test]
    fn decode_handles_byte_at_a_time_arrival() {
        let frame = server_frame(OP_TEXT, true, b"fragmented arrival");
        let mut decoder = FrameDecoder::new();
        for byte in &frame[..frame.len() - 1] {
            decoder.push(std::slice::from_ref(byte));
            assert_eq!(decoder.next().unwrap(), None);
        }
        decoder.push(std::slice::from_ref(frame.last().unwrap()));
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"fragmented arrival".to_vec()))
        );
    }

    #[test]
    fn decode_reassembles_continuation_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(OP_BINARY, false, b"one "));
        decoder.push(&server_frame(OP_CONTINUATION, false, b"two "));
        decoder.push(&server_frame(OP_CONTINUATION, true, b"three"));
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"one two three".to_vec()))
        );
    }

    #[test]
    fn decode_surfaces_control_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(OP_PING, true, b"ka"));
        decoder.push(&server_frame(OP_CLOSE, true, &[]));
        assert_eq!(decoder.next().unwrap(), Some(Incoming::Ping(b"ka".to_vec())));
        assert_eq!(decoder.next().unwrap(), Some(Incoming::Close));
    }

    #[test]
    fn decode_interleaves_messages_after_fragments() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(OP_BINARY, false, b"ab"));
        decoder.push(&server_frame(OP_CONTINUATION, true, b"cd"));
        decoder.push(&server_frame(OP_BINARY, true, b"ef"));
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"abcd".to_vec()))
        );
        assert_eq!(
            decoder.next().unwrap(),
            Some(Incoming::Message(b"ef".to_vec()))
        );
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(0x3, true, b""));
        assert!(decoder.next().is_err());
    }

    #[test]
    fn decode_rejects_orphan_continuation() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&server_frame(OP_CONTINUATION, true, b"orphan"));
        assert!(decoder.next().is_err());
    }
}
