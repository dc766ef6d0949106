//! Frame header structures.
//!
//! Every frame starts with a 32-bit header:
//!
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A sync (11 bits)   B version   C layer   D protection
//! E bitrate index    F sample rate index   G padding   H private
//! I channel mode     J mode extension      K copyright L original   M emphasis
//! ```
//!
//! Geometry (frame length, side information length, samples per frame) is
//! derived from the parsed fields; the header itself is never mutated.

use std::fmt::{self, Display};

use crate::utils::errors::HeaderError;
use crate::utils::tables::{BITRATES_KBPS, SAMPLE_RATES};

/// Mask covering the 11 sync bits of a header word.
pub const SYNC_MASK: u32 = 0xFFE0_0000;

/// Largest `main_data_begin` any version can signal, in bytes.
pub const MAX_MAIN_DATA_BEGIN: usize = 511;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl Version {
    fn from_bits(bits: u32) -> Result<Self, HeaderError> {
        match bits {
            0b11 => Ok(Version::Mpeg1),
            0b10 => Ok(Version::Mpeg2),
            0b00 => Ok(Version::Mpeg25),
            _ => Err(HeaderError::ReservedVersion),
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            Version::Mpeg1 => 0b11,
            Version::Mpeg2 => 0b10,
            Version::Mpeg25 => 0b00,
        }
    }

    /// Row index into per-version tables.
    pub fn index(self) -> usize {
        match self {
            Version::Mpeg1 => 0,
            Version::Mpeg2 => 1,
            Version::Mpeg25 => 2,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Mpeg1 => write!(f, "MPEG-1"),
            Version::Mpeg2 => write!(f, "MPEG-2"),
            Version::Mpeg25 => write!(f, "MPEG-2.5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            ChannelMode::Stereo => 0,
            ChannelMode::JointStereo => 1,
            ChannelMode::DualChannel => 2,
            ChannelMode::Mono => 3,
        }
    }
}

impl Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Stereo => write!(f, "Stereo"),
            ChannelMode::JointStereo => write!(f, "Joint stereo"),
            ChannelMode::DualChannel => write!(f, "Dual channel"),
            ChannelMode::Mono => write!(f, "Mono"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emphasis {
    None,
    Ms50Over15,
    Reserved,
    CcittJ17,
}

impl Emphasis {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Emphasis::None,
            1 => Emphasis::Ms50Over15,
            2 => Emphasis::Reserved,
            _ => Emphasis::CcittJ17,
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            Emphasis::None => 0,
            Emphasis::Ms50Over15 => 1,
            Emphasis::Reserved => 2,
            Emphasis::CcittJ17 => 3,
        }
    }
}

impl Display for Emphasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emphasis::None => write!(f, "None"),
            Emphasis::Ms50Over15 => write!(f, "50/15 ms"),
            Emphasis::Reserved => write!(f, "Reserved"),
            Emphasis::CcittJ17 => write!(f, "CCITT J.17"),
        }
    }
}

/// Parsed Layer III frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: Version,
    /// Always 3; other layers are rejected while parsing.
    pub layer: u8,
    /// `true` when a CRC-16 follows the header (protection bit cleared).
    pub protection: bool,
    pub bitrate_index: u8,
    pub sample_rate_index: u8,
    pub padding: bool,
    pub private: bool,
    pub channel_mode: ChannelMode,
    /// Joint stereo tools: bit 1 is mid/side, bit 0 is intensity.
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: Emphasis,
}

impl FrameHeader {
    /// Parses a big-endian header word.
    ///
    /// Fails without side effects on a missing sync, a reserved version,
    /// layers other than III, free-format or forbidden bitrates and the
    /// reserved sample rate.
    pub fn parse(header_bits: u32) -> Result<Self, HeaderError> {
        if header_bits & SYNC_MASK != SYNC_MASK {
            return Err(HeaderError::MissingSync(header_bits));
        }

        let version = Version::from_bits((header_bits >> 19) & 3)?;

        match (header_bits >> 17) & 3 {
            0b01 => {}
            0b00 => return Err(HeaderError::ReservedLayer),
            layer => return Err(HeaderError::UnsupportedLayer(4 - layer as u8)),
        }

        let bitrate_index = ((header_bits >> 12) & 0xF) as u8;
        match bitrate_index {
            0 => return Err(HeaderError::FreeFormat),
            15 => return Err(HeaderError::ForbiddenBitrate),
            _ => {}
        }

        let sample_rate_index = ((header_bits >> 10) & 3) as u8;
        if sample_rate_index == 3 {
            return Err(HeaderError::ReservedSampleRate);
        }

        Ok(Self {
            version,
            layer: 3,
            protection: (header_bits >> 16) & 1 == 0,
            bitrate_index,
            sample_rate_index,
            padding: (header_bits >> 9) & 1 != 0,
            private: (header_bits >> 8) & 1 != 0,
            channel_mode: ChannelMode::from_bits(header_bits >> 6),
            mode_extension: ((header_bits >> 4) & 3) as u8,
            copyright: (header_bits >> 3) & 1 != 0,
            original: (header_bits >> 2) & 1 != 0,
            emphasis: Emphasis::from_bits(header_bits),
        })
    }

    /// Reads the header at the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        match bytes {
            [a, b, c, d, ..] => Self::parse(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => Err(HeaderError::MissingSync(0)),
        }
    }

    /// Serializes the header back into its 32-bit form.
    pub fn to_bits(&self) -> u32 {
        SYNC_MASK
            | self.version.to_bits() << 19
            | 0b01 << 17
            | (!self.protection as u32) << 16
            | (self.bitrate_index as u32) << 12
            | (self.sample_rate_index as u32) << 10
            | (self.padding as u32) << 9
            | (self.private as u32) << 8
            | self.channel_mode.to_bits() << 6
            | ((self.mode_extension & 3) as u32) << 4
            | (self.copyright as u32) << 3
            | (self.original as u32) << 2
            | self.emphasis.to_bits()
    }

    pub fn is_mpeg1(&self) -> bool {
        self.version == Version::Mpeg1
    }

    pub fn channel_count(&self) -> usize {
        if self.channel_mode == ChannelMode::Mono { 1 } else { 2 }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        BITRATES_KBPS[!self.is_mpeg1() as usize][self.bitrate_index as usize]
    }

    pub fn sample_rate_hz(&self) -> u32 {
        SAMPLE_RATES[self.version.index()][self.sample_rate_index as usize]
    }

    /// Index into the scalefactor band tables.
    pub fn sfb_table_index(&self) -> usize {
        self.version.index() * 3 + self.sample_rate_index as usize
    }

    /// 1152 for MPEG-1, 576 for MPEG-2 and MPEG-2.5.
    pub fn samples_per_frame(&self) -> usize {
        if self.is_mpeg1() { 1152 } else { 576 }
    }

    pub fn granule_count(&self) -> usize {
        if self.is_mpeg1() { 2 } else { 1 }
    }

    /// `floor(samples_per_frame / 8 * bitrate / sample_rate) + padding`.
    pub fn frame_length_bytes(&self) -> usize {
        let slots = self.samples_per_frame() as u64 / 8 * self.bitrate_kbps() as u64 * 1000
            / self.sample_rate_hz() as u64;

        slots as usize + self.padding as usize
    }

    pub fn side_info_length_bytes(&self) -> usize {
        match (self.is_mpeg1(), self.channel_count()) {
            (true, 1) => 17,
            (true, _) => 32,
            (false, 1) => 9,
            (false, _) => 17,
        }
    }

    pub fn crc_length_bytes(&self) -> usize {
        if self.protection { 2 } else { 0 }
    }

    /// Offset of the side information from the start of the frame.
    pub fn side_info_offset(&self) -> usize {
        4 + self.crc_length_bytes()
    }

    /// Bytes of main data carried by this frame itself.
    pub fn main_data_length_bytes(&self) -> usize {
        self.frame_length_bytes()
            .saturating_sub(self.side_info_offset() + self.side_info_length_bytes())
    }

    pub fn ms_stereo(&self) -> bool {
        self.channel_mode == ChannelMode::JointStereo && self.mode_extension & 2 != 0
    }

    pub fn intensity_stereo(&self) -> bool {
        self.channel_mode == ChannelMode::JointStereo && self.mode_extension & 1 != 0
    }

    /// Whether `other` continues the same logical stream: same version,
    /// sample rate and channel count.
    pub fn is_compatible(&self, other: &FrameHeader) -> bool {
        self.version == other.version
            && self.sample_rate_index == other.sample_rate_index
            && self.channel_count() == other.channel_count()
    }
}

impl Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Layer III, {} kbps, {} Hz, {}",
            self.version,
            self.bitrate_kbps(),
            self.sample_rate_hz(),
            self.channel_mode
        )?;
        if self.protection {
            write!(f, ", CRC")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_common_header() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFFB_9064)?;

        assert_eq!(header.version, Version::Mpeg1);
        assert!(!header.protection);
        assert_eq!(header.bitrate_kbps(), 128);
        assert_eq!(header.sample_rate_hz(), 44100);
        assert_eq!(header.channel_mode, ChannelMode::JointStereo);
        assert_eq!(header.mode_extension, 2);
        assert!(header.ms_stereo());
        assert!(!header.intensity_stereo());
        assert!(header.original);
        assert_eq!(header.frame_length_bytes(), 417);
        assert_eq!(header.side_info_length_bytes(), 32);
        assert_eq!(header.main_data_length_bytes(), 417 - 36);

        let padded = FrameHeader::parse(0xFFFB_9264)?;
        assert_eq!(padded.frame_length_bytes(), 418);

        Ok(())
    }

    #[test]
    fn lsf_geometry() -> anyhow::Result<()> {
        // MPEG-2, CRC present, 64 kbps, 22050 Hz, mono
        let header = FrameHeader::parse(0xFFF2_80C0)?;
        assert_eq!(header.version, Version::Mpeg2);
        assert!(header.protection);
        assert_eq!(header.samples_per_frame(), 576);
        assert_eq!(header.granule_count(), 1);
        assert_eq!(header.side_info_length_bytes(), 9);
        assert_eq!(header.frame_length_bytes(), 72 * 64_000 / 22050);
        assert_eq!(header.side_info_offset(), 6);

        Ok(())
    }

    #[test]
    fn rejects_invalid_fields() {
        assert_eq!(
            FrameHeader::parse(0x7FFB_9064),
            Err(HeaderError::MissingSync(0x7FFB_9064))
        );
        assert_eq!(FrameHeader::parse(0xFFEB_9064), Err(HeaderError::ReservedVersion));
        assert_eq!(FrameHeader::parse(0xFFF9_9064), Err(HeaderError::ReservedLayer));
        assert_eq!(FrameHeader::parse(0xFFFD_9064), Err(HeaderError::UnsupportedLayer(2)));
        assert_eq!(FrameHeader::parse(0xFFFF_9064), Err(HeaderError::UnsupportedLayer(1)));
        assert_eq!(FrameHeader::parse(0xFFFB_0064), Err(HeaderError::FreeFormat));
        assert_eq!(FrameHeader::parse(0xFFFB_F064), Err(HeaderError::ForbiddenBitrate));
        assert_eq!(FrameHeader::parse(0xFFFB_9C64), Err(HeaderError::ReservedSampleRate));
    }

    #[test]
    fn frame_length_matches_formula_for_every_header() -> anyhow::Result<()> {
        for version_bits in [0b11u32, 0b10, 0b00] {
            for bitrate_index in 1..15u32 {
                for sample_rate_index in 0..3u32 {
                    for padding in 0..2u32 {
                        for mode in 0..4u32 {
                            let bits = SYNC_MASK
                                | version_bits << 19
                                | 0b01 << 17
                                | 1 << 16
                                | bitrate_index << 12
                                | sample_rate_index << 10
                                | padding << 9
                                | mode << 6;

                            let header = FrameHeader::parse(bits)?;
                            let reparsed = FrameHeader::parse(header.to_bits())?;
                            assert_eq!(header, reparsed);
                            assert_eq!(header.to_bits(), bits);

                            let (coefficient, row, rates) = match version_bits {
                                0b11 => (144_000u64, 0, [44100u64, 48000, 32000]),
                                0b10 => (72_000, 1, [22050, 24000, 16000]),
                                _ => (72_000, 1, [11025, 12000, 8000]),
                            };
                            let bitrate = BITRATES_KBPS[row][bitrate_index as usize] as u64;
                            let expected = coefficient * bitrate / rates[sample_rate_index as usize]
                                + padding as u64;

                            assert_eq!(reparsed.frame_length_bytes() as u64, expected, "{bits:#010X}");
                            assert!(
                                reparsed.frame_length_bytes()
                                    > reparsed.side_info_offset() + reparsed.side_info_length_bytes()
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
