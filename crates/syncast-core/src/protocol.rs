//! Broadcast wire protocol.
//!
//! Every broadcast starts with an 8-byte little-endian `u64` holding the Unix
//! second at which playback should begin. A play message follows the header
//! with the raw media bytes and the literal `end_file` terminator. A stop
//! message is the header alone, carrying timestamp `0`.
//!
//! ```text
//! play:  [start_at: u64 LE][payload ...][b"end_file"]
//! stop:  [0u64 LE]
//! ```

/// Size of the timestamp header in bytes.
pub const HEADER_LEN: usize = 8;

/// Literal sequence marking the end of a play payload.
pub const TERMINATOR: &[u8; 8] = b"end_file";

/// Header value that tells clients to stop playback immediately.
pub const STOP_TIMESTAMP: u64 = 0;

/// A single message fanned out to every connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    /// Start playing `payload` at Unix second `start_at`.
    Play { start_at: u64, payload: Vec<u8> },
    /// Stop playback now.
    Stop,
}

impl BroadcastMessage {
    pub const fn play(start_at: u64, payload: Vec<u8>) -> Self {
        Self::Play { start_at, payload }
    }

    pub const fn stop() -> Self {
        Self::Stop
    }

    /// Timestamp carried in the header.
    pub const fn timestamp(&self) -> u64 {
        match self {
            Self::Play { start_at, .. } => *start_at,
            Self::Stop => STOP_TIMESTAMP,
        }
    }

    /// Number of bytes `encode` produces.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Self::Play { payload, .. } => HEADER_LEN + payload.len() + TERMINATOR.len(),
            Self::Stop => HEADER_LEN,
        }
    }

    /// Encode into a single contiguous buffer, header first.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.timestamp().to_le_bytes());
        if let Self::Play { payload, .. } = self {
            buf.extend_from_slice(payload);
            buf.extend_from_slice(TERMINATOR);
        }
        buf
    }
}

/// Incremental decoder for the byte stream a client receives.
///
/// Bytes may arrive in arbitrary chunks; `push` them as they come and call
/// `next_message` until it returns `None`. The payload of a play message ends
/// at the first occurrence of [`TERMINATOR`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Payload bytes already searched for the terminator without a match.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete message.
    pub const fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Option<BroadcastMessage> {
        let header: [u8; HEADER_LEN] = self.buf.get(..HEADER_LEN)?.try_into().ok()?;
        let start_at = u64::from_le_bytes(header);

        if start_at == STOP_TIMESTAMP {
            self.buf.drain(..HEADER_LEN);
            self.scanned = 0;
            return Some(BroadcastMessage::Stop);
        }

        // Resume the search a terminator's width before where the last one
        // stopped, so a terminator split across pushes is still found.
        let from = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        let body = &self.buf[HEADER_LEN..];
        let Some(offset) = body
            .get(from..)
            .and_then(|rest| rest.windows(TERMINATOR.len()).position(|w| w == TERMINATOR))
        else {
            self.scanned = body.len();
            return None;
        };

        let payload_len = from + offset;
        let payload = body[..payload_len].to_vec();
        self.buf.drain(..HEADER_LEN + payload_len + TERMINATOR.len());
        self.scanned = 0;
        Some(BroadcastMessage::Play { start_at, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_message_layout() {
        let payload = b"RIFF....WAVEfmt ".to_vec();
        let encoded = BroadcastMessage::play(1_700_000_005, payload.clone()).encode();

        assert_eq!(encoded.len(), 8 + payload.len() + 8);
        assert_eq!(
            u64::from_le_bytes(encoded[..8].try_into().unwrap()),
            1_700_000_005
        );
        assert_eq!(&encoded[8..8 + payload.len()], payload.as_slice());
        assert_eq!(&encoded[encoded.len() - 8..], b"end_file");
    }

    #[test]
    fn stop_message_is_header_only() {
        let encoded = BroadcastMessage::stop().encode();
        assert_eq!(encoded, vec![0u8; 8]);
        assert_eq!(BroadcastMessage::stop().encoded_len(), 8);
    }

    #[test]
    fn decoder_waits_for_full_header() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0, 0, 0]);
        assert!(decoder.next_message().is_none());
        decoder.push(&[0, 0, 0, 0, 0]);
        assert_eq!(decoder.next_message(), Some(BroadcastMessage::Stop));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn decoder_handles_terminator_split_across_chunks() {
        let message = BroadcastMessage::play(42, vec![7u8; 300]);
        let encoded = message.encode();

        let mut decoder = FrameDecoder::new();
        // Split inside the terminator.
        let split = encoded.len() - 3;
        decoder.push(&encoded[..split]);
        assert!(decoder.next_message().is_none());
        decoder.push(&encoded[split..]);

        assert_eq!(decoder.next_message(), Some(message));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn decoder_yields_back_to_back_messages() {
        let play = BroadcastMessage::play(99, b"abc".to_vec());
        let mut stream = play.encode();
        stream.extend(BroadcastMessage::stop().encode());

        let mut decoder = FrameDecoder::new();
        for chunk in stream.chunks(5) {
            decoder.push(chunk);
        }

        assert_eq!(decoder.next_message(), Some(play));
        assert_eq!(decoder.next_message(), Some(BroadcastMessage::Stop));
        assert!(decoder.next_message().is_none());
    }
}
