//! CRC-16/CCITT as used by the console (polynomial 0x1021, initial value 0).
//!
//! Every binary frame carries its CRC big-endian at the end, so running the
//! CRC over a whole valid frame yields zero.

const POLY: u16 = 0x1021;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC of `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, &byte| {
        TABLE[((crc >> 8) as u8 ^ byte) as usize] ^ (crc << 8)
    })
}

/// Whether `frame` (payload followed by its CRC) checks out.
pub fn crc_is_valid(frame: &[u8]) -> bool {
    frame.len() >= 2 && crc16(frame) == 0
}

/// Append the big-endian CRC of `buf` to it.
pub fn append_crc(buf: &mut Vec<u8>) {
    let crc = crc16(buf);
    buf.extend_from_slice(&crc.to_be_bytes());
}
