//! Windows-1252 byte/char mapping.

/// Characters Windows-1252 assigns to 0x80..=0x9F. `None` slots are
/// undefined there and fall back to the Latin-1 control character.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Decode one byte as Windows-1252.
pub fn decode_byte(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize].unwrap_or(byte as char),
        _ => byte as char,
    }
}

/// Decode a whole buffer as Windows-1252. Never fails.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}

/// The single byte `c` occupies in Windows-1252 (or Latin-1 for the C1
/// range), if any.
pub fn encode_char(c: char) -> Option<u8> {
    let code = c as u32;
    if code < 0x100 {
        return Some(code as u8);
    }
    CP1252_HIGH
        .iter()
        .position(|slot| *slot == Some(c))
        .map(|i| 0x80 + i as u8)
}
