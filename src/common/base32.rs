//! Unpadded RFC 4648 base32, used to turn arbitrary DHT keys into datastore keys.

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encode bytes as unpadded, uppercase base32.
pub fn encode_base32(input: &[u8]) -> String {
    let mut output = String::with_capacity((input.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for byte in input {
        buffer = (buffer << 8) | *byte as u64;
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            output.push(ALPHABET[((buffer >> bits_in_buffer) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits_in_buffer) - 1;
    }

    if bits_in_buffer > 0 {
        output.push(ALPHABET[((buffer << (5 - bits_in_buffer)) & 0x1f) as usize] as char);
    }

    output
}

/// Decode unpadded base32, returns `None` on characters outside the alphabet.
pub fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let input = input.trim_end_matches('=');

    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in input.bytes() {
        let value = ALPHABET.iter().position(|&x| x == c.to_ascii_uppercase())? as u64;
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            output.push((buffer >> bits_in_buffer) as u8);
            buffer &= (1 << bits_in_buffer) - 1;
        }
    }

    Some(output)
}
