//! CRC validation for protected frames.
//!
//! Frames with the protection bit cleared carry a CRC-16 directly after the
//! header. The checksum covers the last two header bytes followed by the side
//! information.

/// CRC parameters: polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-16 algorithm used by MPEG audio frame protection.
pub const CRC_FRAME_ALG: Algorithm<u16> = Algorithm {
    poly: 0x8005,
    init: 0xFFFF,
};

/// Shifts `value` through `len` rounds of polynomial division, MSB first.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            let index = ((crc >> 8) ^ bytes[i] as u16) & 0xFF;
            crc = (crc << 8) ^ self.table[index as usize];
            i += 1;
        }

        crc
    }

    /// Checksum of a protected frame: header bytes 2..4, then the side information.
    pub const fn frame_checksum(&self, header_tail: &[u8], side_info: &[u8]) -> u16 {
        self.update(self.update(self.init, header_tail), side_info)
    }
}

pub static FRAME_CRC: Crc16 = Crc16::new(&CRC_FRAME_ALG);

#[test]
fn crc16_check_value() {
    assert_eq!(FRAME_CRC.update(FRAME_CRC.init, b"123456789"), 0xAEE7);
}

#[test]
fn crc16_split_input_matches_whole() {
    let data = [0x90u8, 0x64, 0x00, 0x12, 0x34, 0x56, 0x78];
    let whole = FRAME_CRC.update(FRAME_CRC.init, &data);
    assert_eq!(FRAME_CRC.frame_checksum(&data[..2], &data[2..]), whole);
}
