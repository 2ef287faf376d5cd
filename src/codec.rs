//! Tag-length-value framing for uplink payloads.
//!
//! A frame is `H || C || L || P`: the fixed three-byte header `0x01 0x01 0x01`,
//! a one-byte command id, the two-byte big-endian total payload length, and
//! the TLV entries in insertion order. Each entry is
//! `tag (1) || length (2, big-endian) || value (length)`.

const FRAME_HEADER: [u8; 3] = [0x01, 0x01, 0x01];

#[derive(Debug, Default)]
pub struct TlvMessage {
    entries: Vec<TlvEntry>,
}

#[derive(Debug)]
struct TlvEntry {
    tag: u8,
    value: Vec<u8>,
}

impl TlvMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a 1-byte value.
    pub fn add_byte(&mut self, tag: u8, value: u8) {
        self.push(tag, vec![value]);
    }

    /// Append a 4-byte big-endian signed integer.
    pub fn add_int(&mut self, tag: u8, value: i32) {
        self.push(tag, value.to_be_bytes().to_vec());
    }

    /// Append an 8-byte value: the big-endian IEEE-754 encoding of `value` in
    /// the leading 4 bytes, trailing 4 bytes zero.
    pub fn add_float(&mut self, tag: u8, value: f32) {
        let mut buf = vec![0u8; 8];
        buf[..4].copy_from_slice(&value.to_bits().to_be_bytes());
        self.push(tag, buf);
    }

    /// Append the UTF-8 bytes of `value`.
    pub fn add_string(&mut self, tag: u8, value: &str) {
        self.push(tag, value.as_bytes().to_vec());
    }

    fn push(&mut self, tag: u8, value: Vec<u8>) {
        self.entries.push(TlvEntry { tag, value });
    }

    /// Build the full frame. Panics if any value or the total payload exceeds
    /// the 2-byte length field; callers never produce frames that large.
    pub fn encode(&self, command_id: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        for entry in &self.entries {
            let length =
                u16::try_from(entry.value.len()).expect("TLV value exceeds 2-byte length field");
            payload.push(entry.tag);
            payload.extend_from_slice(&length.to_be_bytes());
            payload.extend_from_slice(&entry.value);
        }

        let total =
            u16::try_from(payload.len()).expect("TLV payload exceeds 2-byte length field");

        let mut frame = Vec::with_capacity(FRAME_HEADER.len() + 3 + payload.len());
        frame.extend_from_slice(&FRAME_HEADER);
        frame.push(command_id);
        frame.extend_from_slice(&total.to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Hex rendering of the encoded frame, for debug logging.
    pub fn hex_dump(&self, command_id: u8) -> String {
        hex(&self.encode(command_id))
    }
}

/// Lowercase hex rendering of a byte slice.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test-side decoder: splits a frame back into (command_id, entries).
    fn decode(frame: &[u8]) -> (u8, Vec<(u8, Vec<u8>)>) {
        assert_eq!(&frame[..3], &FRAME_HEADER);
        let command_id = frame[3];
        let total = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        let payload = &frame[6..];
        assert_eq!(payload.len(), total);

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let tag = payload[offset];
            let length =
                u16::from_be_bytes([payload[offset + 1], payload[offset + 2]]) as usize;
            let value = payload[offset + 3..offset + 3 + length].to_vec();
            entries.push((tag, value));
            offset += 3 + length;
        }
        (command_id, entries)
    }

    #[test]
    fn round_trips_entries_in_insertion_order() {
        let mut message = TlvMessage::new();
        message.add_byte(1, 0x7F);
        message.add_int(2, -2);
        message.add_float(3, 1.5);
        message.add_string(4, "mac");

        let (command_id, entries) = decode(&message.encode(9));
        assert_eq!(command_id, 9);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0], (1, vec![0x7F]));
        assert_eq!(entries[1], (2, vec![0xFF, 0xFF, 0xFF, 0xFE]));
        assert_eq!(entries[2].0, 3);
        assert_eq!(entries[2].1.len(), 8);
        assert_eq!(entries[3], (4, b"mac".to_vec()));
    }

    #[test]
    fn float_value_is_big_endian_with_zero_tail() {
        let mut message = TlvMessage::new();
        message.add_float(3, 3.25);

        let (_, entries) = decode(&message.encode(1));
        let value = &entries[0].1;
        assert_eq!(&value[..4], &3.25f32.to_bits().to_be_bytes());
        assert_eq!(&value[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn declared_length_matches_payload() {
        let mut message = TlvMessage::new();
        message.add_string(7, "hello");

        let frame = message.encode(2);
        // tag + 2-byte length + 5 bytes of value
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 8);
        assert_eq!(frame.len(), 6 + 8);
    }

    #[test]
    fn empty_message_encodes_header_only() {
        let frame = TlvMessage::new().encode(5);
        assert_eq!(frame, vec![0x01, 0x01, 0x01, 0x05, 0x00, 0x00]);
    }

    #[test]
    fn string_length_counts_utf8_bytes() {
        let mut message = TlvMessage::new();
        message.add_string(1, "légère");

        let (_, entries) = decode(&message.encode(1));
        assert_eq!(entries[0].1.len(), "légère".len());
    }

    #[test]
    #[should_panic(expected = "2-byte length field")]
    fn oversized_value_panics() {
        let mut message = TlvMessage::new();
        message.add_string(1, &"x".repeat(70_000));
        message.encode(1);
    }

    #[test]
    fn hex_dump_matches_encoding() {
        let mut message = TlvMessage::new();
        message.add_byte(1, 0xAB);
        assert_eq!(message.hex_dump(1), "010101010004010001ab");
    }
}
