//! Huffman decoding, requantization and short-block reordering.

use std::sync::OnceLock;

use crate::structs::header::FrameHeader;
use crate::structs::scalefactors::ScaleFactors;
use crate::structs::side_info::GranuleSideInfo;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::huffman::{is_valid_table, read_pair, read_quad};
use crate::utils::tables::{PRETAB, SFB_LONG, SFB_SHORT};

pub const GRANULE_LINES: usize = 576;

/// Spectral lines covered by the long bands of a mixed block.
pub const MIXED_LONG_LINES: usize = 36;

/// First short band of a mixed block.
const MIXED_FIRST_SHORT: usize = 3;

/// Largest magnitude reachable with 13 linbits.
const MAX_QUANTIZED: usize = 15 + (1 << 13);

/// Result of Huffman decoding one granule of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuffmanResult {
    /// Lines past this index are zero.
    pub nonzero_end: usize,
    /// Big-value decoding ran past `part2_3_length`.
    pub overrun: bool,
}

/// Decodes quantized spectral values until `part3_end` (absolute bit position).
///
/// Big-value pairs use the table of the region they fall in, followed by
/// count1 quadruples until the granule's bits run out or the granule is
/// full. A quadruple that straddles the end is dropped. A big-value pair that straddles the end
/// stops decoding and is reported through [`HuffmanResult::overrun`]; all
/// remaining lines are left at zero.
pub fn read_spectrum(
    reader: &mut BsIoSliceReader,
    gr: &GranuleSideInfo,
    part3_end: u64,
    values: &mut [i32; GRANULE_LINES],
) -> Result<HuffmanResult, DecodeError> {
    values.fill(0);

    let big_end = (gr.big_values as usize * 2).min(GRANULE_LINES);
    for (region, &select) in gr.table_select.iter().enumerate() {
        let start = [0, gr.region1_start, gr.region2_start][region];
        if start < big_end && !is_valid_table(select) {
            return Err(DecodeError::InvalidHuffmanTable(select));
        }
    }

    let mut line = 0;
    while line < big_end {
        let select = if line < gr.region1_start {
            gr.table_select[0]
        } else if line < gr.region2_start {
            gr.table_select[1]
        } else {
            gr.table_select[2]
        };

        match read_pair(reader, select) {
            Ok((x, y)) if reader.position()? <= part3_end => {
                values[line] = x;
                values[line + 1] = y;
                line += 2;
            }
            _ => {
                return Ok(HuffmanResult {
                    nonzero_end: line,
                    overrun: true,
                });
            }
        }
    }

    while line < GRANULE_LINES && reader.position()? < part3_end {
        match read_quad(reader, gr.count1table_select) {
            Ok(quad) if reader.position()? <= part3_end => {
                // A quadruple starting at line 574 only has room for two values
                let kept = (GRANULE_LINES - line).min(4);
                values[line..line + kept].copy_from_slice(&quad[..kept]);
                line += kept;
            }
            _ => break,
        }
    }

    Ok(HuffmanResult {
        nonzero_end: line,
        overrun: false,
    })
}

/// A scalefactor band in the granule's unreordered line layout.
///
/// Short bands are listed once per window; window `w` of band `sfb` occupies
/// `width` lines starting at `3 * start + w * width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub sfb: usize,
    /// `None` for long bands.
    pub window: Option<usize>,
    pub start: usize,
    pub end: usize,
}

/// Scalefactor bands of a granule in line order.
pub fn bands(header: &FrameHeader, gr: &GranuleSideInfo) -> impl Iterator<Item = Band> {
    let long = &SFB_LONG[header.sfb_table_index()];
    let short = &SFB_SHORT[header.sfb_table_index()];

    let (long_bands, long_end, first_short) = if !gr.has_short_windows() {
        (22, GRANULE_LINES, 13)
    } else if gr.mixed_block {
        let count = long.iter().take_while(|&&b| b < MIXED_LONG_LINES).count();
        (count, MIXED_LONG_LINES, MIXED_FIRST_SHORT)
    } else {
        (0, 0, 0)
    };

    let long_iter = (0..long_bands).map(move |sfb| Band {
        sfb,
        window: None,
        start: long[sfb],
        end: long[sfb + 1].min(long_end),
    });

    let short_iter = (first_short..13).flat_map(move |sfb| {
        let width = short[sfb + 1] - short[sfb];
        (0..3).map(move |window| {
            let start = 3 * short[sfb] + window * width;
            Band {
                sfb,
                window: Some(window),
                start,
                end: start + width,
            }
        })
    });

    long_iter.chain(short_iter)
}

fn pow43_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();

    TABLE.get_or_init(|| {
        (0..=MAX_QUANTIZED)
            .map(|v| (v as f64).powf(4.0 / 3.0))
            .collect()
    })
}

#[inline(always)]
fn pow43(value: i32) -> f64 {
    let magnitude = value.unsigned_abs() as usize;
    let scaled = pow43_table()
        .get(magnitude)
        .copied()
        .unwrap_or_else(|| (magnitude as f64).powf(4.0 / 3.0));

    if value < 0 { -scaled } else { scaled }
}

/// Scales quantized values back to spectral amplitudes.
pub fn requantize(
    header: &FrameHeader,
    gr: &GranuleSideInfo,
    sf: &ScaleFactors,
    values: &[i32; GRANULE_LINES],
    nonzero_end: usize,
    out: &mut [f64; GRANULE_LINES],
) {
    out.fill(0.0);

    let global = (gr.global_gain as f64 - 210.0) / 4.0;
    let mult = if gr.scalefac_scale { 1.0 } else { 0.5 };

    for band in bands(header, gr) {
        if band.start >= nonzero_end {
            continue;
        }

        let exponent = match band.window {
            None => {
                let pre = if sf.preflag { PRETAB[band.sfb] } else { 0 };
                global - mult * (sf.long[band.sfb] + pre) as f64
            }
            Some(w) => {
                global
                    - 2.0 * gr.subblock_gain[w] as f64
                    - mult * sf.short[band.sfb][w] as f64
            }
        };
        let gain = exponent.exp2();

        let end = band.end.min(nonzero_end);
        for (x, &v) in out[band.start..end].iter_mut().zip(&values[band.start..end]) {
            if v != 0 {
                *x = pow43(v) * gain;
            }
        }
    }
}

/// Moves short-band lines from band-by-window order into the
/// frequency-by-window interleaving expected by the 12-point transforms.
/// Long bands of mixed blocks stay in place.
pub fn reorder(header: &FrameHeader, gr: &GranuleSideInfo, xr: &mut [f64; GRANULE_LINES]) {
    if !gr.has_short_windows() {
        return;
    }

    let short = &SFB_SHORT[header.sfb_table_index()];
    let first_short = if gr.mixed_block { MIXED_FIRST_SHORT } else { 0 };

    let mut scratch = [0.0; GRANULE_LINES];
    for sfb in first_short..13 {
        let start = short[sfb];
        let width = short[sfb + 1] - start;
        let base = 3 * start;

        for f in 0..width {
            for w in 0..3 {
                scratch[base + 3 * f + w] = xr[base + w * width + f];
            }
        }
    }

    let from = 3 * short[first_short];
    xr[from..].copy_from_slice(&scratch[from..]);
}
