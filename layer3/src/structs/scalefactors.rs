//! Scalefactor structures.
//!
//! Scalefactors open each granule's main data (the "part 2" bits). MPEG-1
//! selects field widths from `scalefac_compress` and may reuse granule 0
//! values in granule 1. MPEG-2 and MPEG-2.5 split the bands into up to four
//! partitions whose sizes and widths are derived from a 9-bit
//! `scalefac_compress`.

use crate::structs::header::FrameHeader;
use crate::structs::side_info::GranuleSideInfo;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::tables::{LSF_PARTITIONS, SLEN};

/// Band groups sharing one `scfsi` flag.
const SCFSI_GROUPS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

/// Intensity position limit for MPEG-1 (positions 7 and above are illegal).
const MPEG1_IS_LIMIT: u8 = 7;

/// Scalefactors of one channel in one granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFactors {
    /// Long bands 0..=20; band 21 never carries a scalefactor.
    pub long: [u8; 22],
    /// Short bands 0..=11 per window; band 12 never carries a scalefactor.
    pub short: [[u8; 3]; 13],
    /// First illegal intensity position per long band.
    pub long_is_limit: [u8; 22],
    /// First illegal intensity position per short band.
    pub short_is_limit: [u8; 13],
    /// Preemphasis, either signalled or implied by MPEG-2 `scalefac_compress`.
    pub preflag: bool,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self {
            long: [0; 22],
            short: [[0; 3]; 13],
            long_is_limit: [MPEG1_IS_LIMIT; 22],
            short_is_limit: [MPEG1_IS_LIMIT; 13],
            preflag: false,
        }
    }
}

impl ScaleFactors {
    /// Reads MPEG-1 scalefactors.
    ///
    /// `previous` holds granule 0 of the same channel and supplies the bands
    /// flagged in `scfsi` when reading granule 1.
    pub fn read_mpeg1(
        reader: &mut BsIoSliceReader,
        gr: &GranuleSideInfo,
        scfsi: &[bool; 4],
        granule: usize,
        previous: &ScaleFactors,
    ) -> Result<Self, DecodeError> {
        let (slen1, slen2) = SLEN[gr.scalefac_compress as usize & 0xF];
        let mut sf = Self {
            preflag: gr.preflag,
            ..Default::default()
        };

        if gr.has_short_windows() {
            let first_short = if gr.mixed_block {
                for band in &mut sf.long[..8] {
                    *band = reader.get_n(slen1)?;
                }
                3
            } else {
                0
            };

            for (sfb, windows) in sf.short[..12].iter_mut().enumerate().skip(first_short) {
                let bits = if sfb < 6 { slen1 } else { slen2 };
                for value in windows.iter_mut() {
                    *value = reader.get_n(bits)?;
                }
            }
        } else {
            for (group, &(start, end)) in SCFSI_GROUPS.iter().enumerate() {
                if granule == 1 && scfsi[group] {
                    sf.long[start..end].copy_from_slice(&previous.long[start..end]);
                    continue;
                }

                let bits = if group < 2 { slen1 } else { slen2 };
                for band in &mut sf.long[start..end] {
                    *band = reader.get_n(bits)?;
                }
            }
        }

        Ok(sf)
    }

    /// Reads MPEG-2/2.5 scalefactors.
    ///
    /// The right channel of an intensity-coded frame uses its own partition
    /// tables and records the illegal position of every band.
    pub fn read_lsf(
        reader: &mut BsIoSliceReader,
        header: &FrameHeader,
        gr: &GranuleSideInfo,
        channel: usize,
    ) -> Result<Self, DecodeError> {
        let intensity_right = header.intensity_stereo() && channel == 1;
        let (slen, table, preflag) = lsf_layout(gr.scalefac_compress, intensity_right);

        let block = if !gr.has_short_windows() {
            0
        } else if gr.mixed_block {
            2
        } else {
            1
        };

        // Flatten the partitions into one run of (value, limit) pairs
        let mut values = [(0u8, 0u8); 36];
        let mut count = 0;
        for (&width, &bands) in slen.iter().zip(&LSF_PARTITIONS[table][block]) {
            for _ in 0..bands {
                values[count] = (reader.get_n(width)?, ((1u32 << width) - 1) as u8);
                count += 1;
            }
        }

        let mut sf = Self {
            preflag,
            ..Default::default()
        };
        let mut values = values[..count].iter().copied();

        match block {
            0 => {
                for (band, (value, limit)) in values.by_ref().take(21).enumerate() {
                    sf.long[band] = value;
                    sf.long_is_limit[band] = limit;
                }
                sf.long_is_limit[21] = sf.long_is_limit[20];
            }
            _ => {
                let first_short = if block == 2 {
                    for (band, (value, limit)) in values.by_ref().take(6).enumerate() {
                        sf.long[band] = value;
                        sf.long_is_limit[band] = limit;
                    }
                    3
                } else {
                    0
                };

                for sfb in first_short..12 {
                    for window in 0..3 {
                        if let Some((value, limit)) = values.next() {
                            sf.short[sfb][window] = value;
                            sf.short_is_limit[sfb] = limit;
                        }
                    }
                }
                sf.short_is_limit[12] = sf.short_is_limit[11];
            }
        }

        Ok(sf)
    }
}

/// Field widths, partition table and implied preflag for MPEG-2 `scalefac_compress`.
fn lsf_layout(scalefac_compress: u16, intensity_right: bool) -> ([u32; 4], usize, bool) {
    let sc = scalefac_compress as u32;

    if !intensity_right {
        if sc < 400 {
            ([(sc >> 4) / 5, (sc >> 4) % 5, (sc & 15) >> 2, sc & 3], 0, false)
        } else if sc < 500 {
            let sc = sc - 400;
            ([(sc >> 2) / 5, (sc >> 2) % 5, sc & 3, 0], 1, false)
        } else {
            let sc = sc - 500;
            ([sc / 3, sc % 3, 0, 0], 2, true)
        }
    } else {
        let sc = sc >> 1;
        if sc < 180 {
            ([sc / 36, (sc % 36) / 6, (sc % 36) % 6, 0], 3, false)
        } else if sc < 244 {
            let sc = sc - 180;
            ([(sc & 0x3F) >> 4, (sc & 15) >> 2, sc & 3, 0], 4, false)
        } else {
            let sc = sc - 244;
            ([sc / 3, sc % 3, 0, 0], 5, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{long_granule, short_granule};
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    #[test]
    fn lsf_layout_ranges() {
        assert_eq!(lsf_layout(0, false), ([0, 0, 0, 0], 0, false));
        assert_eq!(lsf_layout(399, false), ([4, 4, 3, 3], 0, false));
        assert_eq!(lsf_layout(450, false), ([2, 2, 2, 0], 1, false));
        assert_eq!(lsf_layout(505, false), ([1, 2, 0, 0], 2, true));
        assert_eq!(lsf_layout(2 * 100, true), ([2, 4, 4, 0], 3, false));
        assert_eq!(lsf_layout(2 * 200, true), ([1, 1, 0, 0], 4, false));
        assert_eq!(lsf_layout(2 * 250, true), ([2, 0, 0, 0], 5, false));
    }

    #[test]
    fn mpeg1_scfsi_reuses_granule_zero() -> anyhow::Result<()> {
        // scalefac_compress 15: slen1 = 4, slen2 = 3
        let mut gr = long_granule(0, 0, 0);
        gr.scalefac_compress = 15;

        let mut writer = BitWriter::endian(Vec::new(), BigEndian);
        for band in 0..11u8 {
            writer.write_var::<u8>(4, band)?;
        }
        for band in 11..21u8 {
            writer.write_var::<u8>(3, band & 7)?;
        }
        // granule 1 only carries groups 1 and 3
        for _ in 6..11 {
            writer.write_var::<u8>(4, 9)?;
        }
        for _ in 16..21 {
            writer.write_var::<u8>(3, 1)?;
        }
        writer.byte_align()?;
        let bytes = writer.into_writer();

        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let first = ScaleFactors::read_mpeg1(reader, &gr, &[false; 4], 0, &Default::default())?;
        assert_eq!(first.long[10], 10);
        assert_eq!(first.long[15], 15 & 7);

        let second =
            ScaleFactors::read_mpeg1(reader, &gr, &[true, false, true, false], 1, &first)?;
        assert_eq!(&second.long[..6], &first.long[..6]);
        assert_eq!(&second.long[6..11], &[9; 5]);
        assert_eq!(&second.long[11..16], &first.long[11..16]);
        assert_eq!(&second.long[16..21], &[1; 5]);
        assert_eq!(reader.position()?, 11 * 4 + 10 * 3 + 5 * 4 + 5 * 3);

        Ok(())
    }

    #[test]
    fn mpeg1_mixed_block_layout() -> anyhow::Result<()> {
        // scalefac_compress 5: slen1 = 1, slen2 = 1
        let mut gr = short_granule(0, 0, true);
        gr.scalefac_compress = 5;

        let bytes = vec![0xFF; 8];
        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let sf = ScaleFactors::read_mpeg1(reader, &gr, &[false; 4], 0, &Default::default())?;

        assert_eq!(&sf.long[..8], &[1; 8]);
        assert_eq!(sf.short[2], [0; 3]);
        assert_eq!(sf.short[3], [1; 3]);
        assert_eq!(sf.short[11], [1; 3]);
        assert_eq!(sf.short[12], [0; 3]);
        assert_eq!(reader.position()?, 8 + 9 * 3);

        Ok(())
    }

    #[test]
    fn lsf_intensity_limits() -> anyhow::Result<()> {
        // MPEG-2 joint stereo with intensity, right channel, isc = 250 -> slen [2, 0]
        let header = FrameHeader::parse(0xFFF3_9054)?;
        let mut gr = long_granule(0, 0, 0);
        gr.scalefac_compress = 500;

        let bytes = vec![0xFF; 8];
        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let sf = ScaleFactors::read_lsf(reader, &header, &gr, 1)?;

        // partition table 5, long: 8 bands of 2 bits, then 8 + 5 bands of 0 bits
        assert_eq!(&sf.long[..8], &[3; 8]);
        assert_eq!(&sf.long_is_limit[..8], &[3; 8]);
        assert_eq!(sf.long[8], 0);
        assert_eq!(sf.long_is_limit[8], 0);
        assert_eq!(sf.long_is_limit[21], sf.long_is_limit[20]);
        assert!(!sf.preflag);
        assert_eq!(reader.position()?, 16);

        Ok(())
    }
}
