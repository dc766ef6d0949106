//! Alias reduction, IMDCT, windowing, overlap-add and frequency inversion.

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::process::requantize::GRANULE_LINES;
use crate::structs::side_info::{BlockType, GranuleSideInfo};

pub const SUBBANDS: usize = 32;
pub const SUBBAND_LINES: usize = 18;

/// Subband samples of one granule, indexed by `[time slot][subband]`.
pub type SubbandBlock = [[f64; SUBBANDS]; SUBBAND_LINES];

const ALIAS_COEFFICIENTS: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

struct Tables {
    /// Butterfly `(cs, ca)` pairs.
    alias: [(f64, f64); 8],
    /// Long windows by block type.
    windows: [[f64; 36]; 4],
    short_window: [f64; 12],
    cos36: [[f64; 18]; 36],
    cos12: [[f64; 6]; 12],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();

    TABLES.get_or_init(|| {
        let mut alias = [(0.0, 0.0); 8];
        for (pair, &c) in alias.iter_mut().zip(&ALIAS_COEFFICIENTS) {
            let norm = (1.0 + c * c).sqrt();
            *pair = (1.0 / norm, c / norm);
        }

        let long = |i: usize| (PI / 36.0 * (i as f64 + 0.5)).sin();
        let short = |i: usize| (PI / 12.0 * (i as f64 + 0.5)).sin();

        let mut windows = [[0.0; 36]; 4];
        for i in 0..36 {
            windows[0][i] = long(i);

            windows[1][i] = match i {
                0..18 => long(i),
                18..24 => 1.0,
                24..30 => short(i - 18),
                _ => 0.0,
            };

            windows[3][i] = match i {
                0..6 => 0.0,
                6..12 => short(i - 6),
                12..18 => 1.0,
                _ => long(i),
            };
        }

        let mut short_window = [0.0; 12];
        for (i, w) in short_window.iter_mut().enumerate() {
            *w = short(i);
        }

        let mut cos36 = [[0.0; 18]; 36];
        for (i, row) in cos36.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = (PI / 72.0 * (2 * i + 1 + 18) as f64 * (2 * k + 1) as f64).cos();
            }
        }

        let mut cos12 = [[0.0; 6]; 12];
        for (i, row) in cos12.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = (PI / 24.0 * (2 * i + 1 + 6) as f64 * (2 * k + 1) as f64).cos();
            }
        }

        Tables {
            alias,
            windows,
            short_window,
            cos36,
            cos12,
        }
    })
}

/// Applies the anti-alias butterflies between neighbouring subbands.
///
/// Long blocks use every boundary, mixed blocks only the one between
/// subbands 0 and 1, pure short blocks none.
pub fn reduce_aliases(gr: &GranuleSideInfo, xr: &mut [f64; GRANULE_LINES]) {
    let boundaries = if gr.is_short() {
        return;
    } else if gr.is_mixed() {
        1
    } else {
        SUBBANDS - 1
    };

    let alias = &tables().alias;
    for sb in 1..=boundaries {
        let edge = sb * SUBBAND_LINES;
        for (i, &(cs, ca)) in alias.iter().enumerate() {
            let lower = xr[edge - 1 - i];
            let upper = xr[edge + i];
            xr[edge - 1 - i] = lower * cs - upper * ca;
            xr[edge + i] = upper * cs + lower * ca;
        }
    }
}

fn imdct36(input: &[f64], window: &[f64; 36], out: &mut [f64; 36]) {
    let cos = &tables().cos36;
    for (i, y) in out.iter_mut().enumerate() {
        let sum: f64 = cos[i].iter().zip(input).map(|(c, x)| c * x).sum();
        *y = sum * window[i];
    }
}

fn imdct12x3(input: &[f64], out: &mut [f64; 36]) {
    let t = tables();
    out.fill(0.0);

    for w in 0..3 {
        for i in 0..12 {
            let sum: f64 = (0..6).map(|k| t.cos12[i][k] * input[3 * k + w]).sum();
            out[6 + 6 * w + i] += sum * t.short_window[i];
        }
    }
}

/// Inverse transform stage of one channel, holding the overlap of the previous granule.
#[derive(Debug, Clone)]
pub struct HybridSynthesis {
    overlap: [[f64; SUBBAND_LINES]; SUBBANDS],
}

impl Default for HybridSynthesis {
    fn default() -> Self {
        Self {
            overlap: [[0.0; SUBBAND_LINES]; SUBBANDS],
        }
    }
}

impl HybridSynthesis {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Transforms a reordered, alias-reduced granule into subband samples.
    pub fn process(&mut self, gr: &GranuleSideInfo, xr: &[f64; GRANULE_LINES], out: &mut SubbandBlock) {
        let t = tables();
        let mut raw = [0.0; 36];

        for sb in 0..SUBBANDS {
            let input = &xr[sb * SUBBAND_LINES..(sb + 1) * SUBBAND_LINES];

            if input.iter().all(|&x| x == 0.0) {
                raw.fill(0.0);
            } else if gr.has_short_windows() && !(gr.mixed_block && sb < 2) {
                imdct12x3(input, &mut raw);
            } else {
                let block = if gr.is_mixed() {
                    BlockType::Normal
                } else {
                    gr.block_type
                };
                imdct36(input, &t.windows[block.to_bits() as usize], &mut raw);
            }

            let overlap = &mut self.overlap[sb];
            for i in 0..SUBBAND_LINES {
                let mut sample = raw[i] + overlap[i];
                if sb % 2 == 1 && i % 2 == 1 {
                    sample = -sample;
                }
                out[i][sb] = sample;
                overlap[i] = raw[SUBBAND_LINES + i];
            }
        }
    }
}
