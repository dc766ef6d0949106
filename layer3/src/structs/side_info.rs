//! Side information structures.
//!
//! Side information follows the header (and CRC) at a fixed position and
//! describes how the main data of each granule and channel is laid out.

use crate::structs::header::FrameHeader;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::tables::{SFB_LONG, SFB_SHORT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockType {
    #[default]
    Normal,
    Start,
    Short,
    Stop,
}

impl BlockType {
    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => BlockType::Normal,
            1 => BlockType::Start,
            2 => BlockType::Short,
            _ => BlockType::Stop,
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            BlockType::Normal => 0,
            BlockType::Start => 1,
            BlockType::Short => 2,
            BlockType::Stop => 3,
        }
    }
}

/// Side information of one channel in one granule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GranuleSideInfo {
    pub part2_3_length: u16,
    pub big_values: u16,
    pub global_gain: u8,
    pub scalefac_compress: u16,
    pub window_switching: bool,
    pub block_type: BlockType,
    pub mixed_block: bool,
    pub table_select: [u8; 3],
    pub subblock_gain: [u8; 3],
    pub region0_count: u8,
    pub region1_count: u8,
    pub preflag: bool,
    pub scalefac_scale: bool,
    pub count1table_select: bool,

    /// First spectral line decoded with `table_select[1]`.
    pub region1_start: usize,
    /// First spectral line decoded with `table_select[2]`.
    pub region2_start: usize,
}

impl GranuleSideInfo {
    fn read(header: &FrameHeader, reader: &mut BsIoSliceReader) -> Result<Self, DecodeError> {
        let mut gr = Self {
            part2_3_length: reader.get_n(12)?,
            big_values: reader.get_n(9)?,
            global_gain: reader.get_n(8)?,
            scalefac_compress: reader.get_n(if header.is_mpeg1() { 4 } else { 9 })?,
            window_switching: reader.get()?,
            ..Default::default()
        };

        if gr.big_values > 288 {
            return Err(DecodeError::InvalidSideInfo("big_values exceeds 288"));
        }

        if gr.window_switching {
            gr.block_type = BlockType::from_bits(reader.get_n(2)?);
            gr.mixed_block = reader.get()?;
            for select in &mut gr.table_select[..2] {
                *select = reader.get_n(5)?;
            }
            for gain in &mut gr.subblock_gain {
                *gain = reader.get_n(3)?;
            }

            if gr.block_type == BlockType::Normal {
                return Err(DecodeError::InvalidSideInfo(
                    "window switching with a normal block type",
                ));
            }

            // Implicit region split: region1 covers everything above region0
            gr.region0_count = if gr.block_type == BlockType::Short && !gr.mixed_block {
                8
            } else {
                7
            };
        } else {
            for select in &mut gr.table_select {
                *select = reader.get_n(5)?;
            }
            gr.region0_count = reader.get_n(4)?;
            gr.region1_count = reader.get_n(3)?;
        }

        if header.is_mpeg1() {
            gr.preflag = reader.get()?;
        }
        gr.scalefac_scale = reader.get()?;
        gr.count1table_select = reader.get()?;

        gr.update_regions(header);

        Ok(gr)
    }

    pub(crate) fn update_regions(&mut self, header: &FrameHeader) {
        let long = &SFB_LONG[header.sfb_table_index()];

        if self.window_switching {
            self.region1_start = if self.block_type == BlockType::Short && !self.mixed_block {
                SFB_SHORT[header.sfb_table_index()][(self.region0_count as usize + 1) / 3] * 3
            } else {
                long[self.region0_count as usize + 1]
            };
            self.region2_start = 576;
        } else {
            let region1 = self.region0_count as usize + 1;
            let region2 = region1 + self.region1_count as usize + 1;
            self.region1_start = long[region1.min(22)];
            self.region2_start = long[region2.min(22)];
        }
    }

    /// Pure short blocks, the only layout without any long bands.
    pub fn is_short(&self) -> bool {
        self.window_switching && self.block_type == BlockType::Short && !self.mixed_block
    }

    pub fn is_mixed(&self) -> bool {
        self.window_switching && self.block_type == BlockType::Short && self.mixed_block
    }

    /// Whether any part of the granule uses short windows.
    pub fn has_short_windows(&self) -> bool {
        self.window_switching && self.block_type == BlockType::Short
    }
}

/// Side information of a complete frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideInfo {
    /// Backward offset in bytes from the frame's own main data.
    pub main_data_begin: u16,
    pub private_bits: u8,
    /// MPEG-1 scalefactor reuse flags per channel and band group.
    pub scfsi: [[bool; 4]; 2],
    /// Indexed by `[granule][channel]`.
    pub granules: [[GranuleSideInfo; 2]; 2],
}

impl SideInfo {
    pub fn read(header: &FrameHeader, reader: &mut BsIoSliceReader) -> Result<Self, DecodeError> {
        let channels = header.channel_count();
        let mut si = Self::default();

        if header.is_mpeg1() {
            si.main_data_begin = reader.get_n(9)?;
            si.private_bits = reader.get_n(if channels == 1 { 5 } else { 3 })?;
            for scfsi in &mut si.scfsi[..channels] {
                for flag in scfsi.iter_mut() {
                    *flag = reader.get()?;
                }
            }
        } else {
            si.main_data_begin = reader.get_n(8)?;
            si.private_bits = reader.get_n(if channels == 1 { 1 } else { 2 })?;
        }

        for granule in &mut si.granules[..header.granule_count()] {
            for gr in &mut granule[..channels] {
                *gr = GranuleSideInfo::read(header, reader)?;
            }
        }

        Ok(si)
    }

    /// Total part2_3 bits declared for the frame.
    pub fn main_data_bits(&self, header: &FrameHeader) -> usize {
        self.granules[..header.granule_count()]
            .iter()
            .flat_map(|granule| granule[..header.channel_count()].iter())
            .map(|gr| gr.part2_3_length as usize)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{long_granule, short_granule, write_side_info};

    #[test]
    fn side_info_round_trip_mpeg1_stereo() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFFB_9044)?;

        let mut si = SideInfo {
            main_data_begin: 300,
            private_bits: 5,
            scfsi: [[true, false, true, false], [false, true, false, true]],
            ..Default::default()
        };
        si.granules[0][0] = long_granule(120, 15, 170);
        si.granules[0][1] = short_granule(64, 150, false);
        si.granules[1][0] = short_granule(12, 160, true);
        si.granules[1][1] = long_granule(0, 0, 0);

        let bytes = write_side_info(&header, &si)?;
        assert_eq!(bytes.len(), header.side_info_length_bytes());

        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let parsed = SideInfo::read(&header, reader)?;

        let mut expected = si.clone();
        for granule in &mut expected.granules {
            for gr in granule.iter_mut() {
                gr.update_regions(&header);
            }
        }
        assert_eq!(parsed, expected);

        Ok(())
    }

    #[test]
    fn implicit_regions_for_window_switching() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFFB_90C4)?;
        let mut gr = short_granule(0, 0, false);
        gr.update_regions(&header);
        assert_eq!(gr.region1_start, 36);
        assert_eq!(gr.region2_start, 576);

        let mut start = short_granule(0, 0, false);
        start.block_type = BlockType::Start;
        start.region0_count = 7;
        start.update_regions(&header);
        assert_eq!(start.region1_start, 36);

        // MPEG-2.5 at 8 kHz has wider bands
        let header = FrameHeader::parse(0xFFE3_18C4)?;
        gr.update_regions(&header);
        assert_eq!(gr.region1_start, 72);

        Ok(())
    }

    #[test]
    fn rejects_normal_block_with_window_switching() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFFB_90C4)?;
        let mut si = SideInfo::default();
        si.granules[0][0] = short_granule(0, 0, false);
        si.granules[0][0].block_type = BlockType::Normal;

        let bytes = write_side_info(&header, &si)?;
        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        assert!(matches!(
            SideInfo::read(&header, reader),
            Err(DecodeError::InvalidSideInfo(_))
        ));

        Ok(())
    }
}
