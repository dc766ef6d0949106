//! Synthetic frame construction for unit tests.

use std::io;

use bitstream_io::{BigEndian, BitWrite, BitWriter};

use crate::structs::header::FrameHeader;
use crate::structs::side_info::{BlockType, GranuleSideInfo, SideInfo};
use crate::utils::crc::FRAME_CRC;
use crate::utils::huffman::{PAIR_TABLES, pair_code};

/// MPEG-1, 128 kbps, 44100 Hz, mono, no CRC: 417-byte frames.
pub(crate) const MONO_HEADER: u32 = 0xFFFB_90C4;
/// MPEG-1, 128 kbps, 44100 Hz, stereo, no CRC.
pub(crate) const STEREO_HEADER: u32 = 0xFFFB_9004;
/// MPEG-1, 128 kbps, 44100 Hz, joint stereo with intensity only.
pub(crate) const INTENSITY_HEADER: u32 = 0xFFFB_9054;
/// MPEG-1, 128 kbps, 44100 Hz, joint stereo with mid/side only.
pub(crate) const MID_SIDE_HEADER: u32 = 0xFFFB_9064;
/// MPEG-1, 128 kbps, 44100 Hz, mono, CRC protected.
pub(crate) const PROTECTED_HEADER: u32 = 0xFFFA_90C4;
/// MPEG-2, 64 kbps, 22050 Hz, mono, no CRC.
pub(crate) const LSF_HEADER: u32 = 0xFFF3_80C4;

pub(crate) fn long_granule(part2_3_length: u16, big_values: u16, global_gain: u8) -> GranuleSideInfo {
    GranuleSideInfo {
        part2_3_length,
        big_values,
        global_gain,
        table_select: [7, 5, 7],
        region0_count: 7,
        region1_count: 3,
        ..Default::default()
    }
}

pub(crate) fn short_granule(part2_3_length: u16, global_gain: u8, mixed: bool) -> GranuleSideInfo {
    GranuleSideInfo {
        part2_3_length,
        global_gain,
        window_switching: true,
        block_type: BlockType::Short,
        mixed_block: mixed,
        table_select: [7, 7, 0],
        subblock_gain: [0, 1, 2],
        region0_count: if mixed { 7 } else { 8 },
        ..Default::default()
    }
}

fn write_granule<W: BitWrite>(
    writer: &mut W,
    header: &FrameHeader,
    gr: &GranuleSideInfo,
) -> io::Result<()> {
    writer.write_var::<u16>(12, gr.part2_3_length)?;
    writer.write_var::<u16>(9, gr.big_values)?;
    writer.write_var::<u8>(8, gr.global_gain)?;
    writer.write_var::<u16>(if header.is_mpeg1() { 4 } else { 9 }, gr.scalefac_compress)?;
    writer.write_bit(gr.window_switching)?;

    if gr.window_switching {
        writer.write_var::<u8>(2, gr.block_type.to_bits())?;
        writer.write_bit(gr.mixed_block)?;
        for &select in &gr.table_select[..2] {
            writer.write_var::<u8>(5, select)?;
        }
        for &gain in &gr.subblock_gain {
            writer.write_var::<u8>(3, gain)?;
        }
    } else {
        for &select in &gr.table_select {
            writer.write_var::<u8>(5, select)?;
        }
        writer.write_var::<u8>(4, gr.region0_count)?;
        writer.write_var::<u8>(3, gr.region1_count)?;
    }

    if header.is_mpeg1() {
        writer.write_bit(gr.preflag)?;
    }
    writer.write_bit(gr.scalefac_scale)?;
    writer.write_bit(gr.count1table_select)
}

/// Serializes side information in bitstream order.
pub(crate) fn write_side_info(header: &FrameHeader, si: &SideInfo) -> io::Result<Vec<u8>> {
    let channels = header.channel_count();
    let mut writer = BitWriter::endian(Vec::new(), BigEndian);

    if header.is_mpeg1() {
        writer.write_var::<u16>(9, si.main_data_begin)?;
        writer.write_var::<u8>(if channels == 1 { 5 } else { 3 }, si.private_bits)?;
        for scfsi in &si.scfsi[..channels] {
            for &flag in scfsi {
                writer.write_bit(flag)?;
            }
        }
    } else {
        writer.write_var::<u16>(8, si.main_data_begin)?;
        writer.write_var::<u8>(if channels == 1 { 1 } else { 2 }, si.private_bits)?;
    }

    for granule in &si.granules[..header.granule_count()] {
        for gr in &granule[..channels] {
            write_granule(&mut writer, header, gr)?;
        }
    }

    writer.byte_align()?;
    Ok(writer.into_writer())
}

fn push_bits(bits: &mut Vec<bool>, len: u32, value: u32) {
    for i in (0..len).rev() {
        bits.push((value >> i) & 1 != 0);
    }
}

/// Huffman bits for big-value pairs, switching tables at the region boundaries.
pub(crate) fn big_value_bits(gr: &GranuleSideInfo, values: &[i32]) -> Vec<bool> {
    let mut bits = Vec::new();

    for (pair, chunk) in values.chunks(2).enumerate() {
        let line = pair * 2;
        let region = if line < gr.region1_start {
            0
        } else if line < gr.region2_start {
            1
        } else {
            2
        };
        let select = gr.table_select[region];
        let linbits = PAIR_TABLES[select as usize].linbits;

        let (x, y) = (chunk[0], chunk.get(1).copied().unwrap_or(0));
        let (cx, cy) = (x.unsigned_abs().min(15), y.unsigned_abs().min(15));
        let (code, len) = pair_code(select, cx as usize, cy as usize);
        push_bits(&mut bits, len as u32, code as u32);

        for (value, coded) in [(x, cx), (y, cy)] {
            if linbits > 0 && coded == 15 {
                push_bits(&mut bits, linbits, value.unsigned_abs() - 15);
            }
            if value != 0 {
                bits.push(value < 0);
            }
        }
    }

    bits
}

fn to_bytes(bits: &[bool]) -> Vec<u8> {
    let mut writer = BitWriter::endian(Vec::new(), BigEndian);
    for &bit in bits {
        // Writing into a Vec cannot fail
        let _ = writer.write_bit(bit);
    }
    let _ = writer.byte_align();
    writer.into_writer()
}

/// Assembles one frame from side information and per-granule main data.
pub(crate) struct FrameBuilder {
    header: FrameHeader,
    side_info: SideInfo,
    main_bits: Vec<bool>,
}

impl FrameBuilder {
    pub(crate) fn new(header_bits: u32) -> Self {
        Self {
            header: FrameHeader::parse(header_bits).expect("test header"),
            side_info: SideInfo::default(),
            main_bits: Vec::new(),
        }
    }

    pub(crate) fn scfsi(mut self, channel: usize, scfsi: [bool; 4]) -> Self {
        self.side_info.scfsi[channel] = scfsi;
        self
    }

    /// Appends a granule's main data: raw scalefactor bits, then Huffman-coded
    /// big values. Granules must be added in bitstream order.
    pub(crate) fn granule(
        mut self,
        granule: usize,
        channel: usize,
        mut gr: GranuleSideInfo,
        scalefactor_bits: &[bool],
        values: &[i32],
    ) -> Self {
        gr.big_values = values.len().div_ceil(2) as u16;
        gr.update_regions(&self.header);

        let mut bits = scalefactor_bits.to_vec();
        bits.extend(big_value_bits(&gr, values));
        gr.part2_3_length = bits.len() as u16;

        self.main_bits.extend(bits);
        self.side_info.granules[granule][channel] = gr;
        self
    }

    /// Main data bytes of this frame.
    pub(crate) fn main_data(&self) -> Vec<u8> {
        to_bytes(&self.main_bits)
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let main = self.main_data();
        self.build_with(0, &main)
    }

    /// Builds the frame with an explicit `main_data_begin` and main data area contents.
    pub(crate) fn build_with(mut self, main_data_begin: u16, main_data: &[u8]) -> Vec<u8> {
        self.side_info.main_data_begin = main_data_begin;

        let header = self.header;
        let side = write_side_info(&header, &self.side_info).expect("side info");

        let mut frame = header.to_bits().to_be_bytes().to_vec();
        if header.protection {
            let crc = FRAME_CRC.frame_checksum(&frame[2..4], &side);
            frame.extend_from_slice(&crc.to_be_bytes());
        }
        frame.extend_from_slice(&side);

        let mut area = vec![0u8; header.main_data_length_bytes()];
        assert!(main_data.len() <= area.len(), "main data does not fit the frame");
        area[..main_data.len()].copy_from_slice(main_data);
        frame.extend_from_slice(&area);

        assert_eq!(frame.len(), header.frame_length_bytes());
        frame
    }
}

/// A frame whose every granule carries no spectral data.
pub(crate) fn silent_frame(header_bits: u32, main_data_begin: u16) -> Vec<u8> {
    FrameBuilder::new(header_bits).build_with(main_data_begin, &[])
}

/// Raw scalefactor bits, each value written with its own width.
pub(crate) fn scalefactor_bits(fields: &[(u32, u32)]) -> Vec<bool> {
    let mut bits = Vec::new();
    for &(len, value) in fields {
        push_bits(&mut bits, len, value);
    }
    bits
}

/// A long-block granule carrying a handful of low-frequency lines.
pub(crate) fn tone_values(seed: i32) -> Vec<i32> {
    (0..16)
        .map(|i| match (i + seed) % 5 {
            0 => 1,
            1 => -2,
            2 => 0,
            3 => 3,
            _ => -1,
        })
        .collect()
}
