//! Polyphase synthesis filter bank (ISO/IEC 11172-3, 2.4.3.2.2).

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::process::hybrid::SUBBANDS;
use crate::utils::tables::SYNTHESIS_WINDOW;

const HISTORY: usize = 1024;

/// Output multiplier mapping the nominal `[-1, 1)` range onto 16-bit PCM.
pub const DEFAULT_OUTPUT_SCALE: f64 = 32700.0;

fn matrix() -> &'static [[f64; SUBBANDS]; 64] {
    static MATRIX: OnceLock<[[f64; SUBBANDS]; 64]> = OnceLock::new();

    MATRIX.get_or_init(|| {
        let mut n = [[0.0; SUBBANDS]; 64];
        for (i, row) in n.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = ((16 + i) as f64 * (2 * k + 1) as f64 * PI / 64.0).cos();
            }
        }
        n
    })
}

/// Synthesis state of one output channel.
///
/// Every call to [`push_block`](Self::push_block) turns 32 subband samples
/// into 32 PCM samples. The rolling history is never shared between channels.
#[derive(Debug, Clone)]
pub struct SynthesisFilterBank {
    channel: u8,
    scale: f64,
    v: [f64; HISTORY],
    offset: usize,
}

impl SynthesisFilterBank {
    pub fn new(channel: u8, scale: f64) -> Self {
        Self {
            channel,
            scale,
            v: [0.0; HISTORY],
            offset: 0,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Clears the history, as after a resynchronization.
    pub fn reset(&mut self) {
        self.v = [0.0; HISTORY];
        self.offset = 0;
    }

    pub fn push_block(&mut self, samples: &[f64; SUBBANDS]) -> [i16; SUBBANDS] {
        self.offset = (self.offset + HISTORY - 64) & (HISTORY - 1);

        for (i, row) in matrix().iter().enumerate() {
            self.v[self.offset + i] = row.iter().zip(samples).map(|(n, s)| n * s).sum();
        }

        let mut pcm = [0i16; SUBBANDS];
        for (j, out) in pcm.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..8 {
                let lo = (self.offset + 128 * i + j) & (HISTORY - 1);
                let hi = (self.offset + 128 * i + 96 + j) & (HISTORY - 1);
                sum += self.v[lo] * SYNTHESIS_WINDOW[64 * i + j];
                sum += self.v[hi] * SYNTHESIS_WINDOW[64 * i + 32 + j];
            }

            *out = (sum * self.scale).clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        }

        pcm
    }
}
