//! Joint stereo reconstruction.
//!
//! Runs on both channels' requantized spectra before short-block reordering,
//! so every short band window is still a contiguous run of lines.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::process::requantize::{GRANULE_LINES, bands};
use crate::structs::header::FrameHeader;
use crate::structs::scalefactors::ScaleFactors;
use crate::structs::side_info::GranuleSideInfo;

/// Intensity position with an infinite tangent ratio (all energy left).
const MPEG1_IS_FULL_LEFT: u8 = 6;

/// Left and right gains for a legal intensity position.
fn intensity_gains(header: &FrameHeader, position: u8, right_compress: u16) -> (f64, f64) {
    if header.is_mpeg1() {
        if position == MPEG1_IS_FULL_LEFT {
            return (1.0, 0.0);
        }
        let ratio = (position as f64 * PI / 12.0).tan();
        return (ratio / (1.0 + ratio), 1.0 / (1.0 + ratio));
    }

    let io: f64 = if right_compress & 1 == 1 {
        FRAC_1_SQRT_2
    } else {
        (-0.25f64).exp2()
    };

    match position {
        0 => (1.0, 1.0),
        p if p % 2 == 1 => (io.powi((p as i32 + 1) / 2), 1.0),
        p => (1.0, io.powi(p as i32 / 2)),
    }
}

/// Applies mid/side and intensity stereo as enabled by the frame header.
///
/// `right` describes the right channel's granule; its block layout and
/// scalefactors drive the intensity bands. Bands with an illegal intensity
/// position fall back to mid/side (when enabled) or are left untouched.
pub fn process_stereo(
    header: &FrameHeader,
    right: &GranuleSideInfo,
    right_sf: &ScaleFactors,
    xr: &mut [[f64; GRANULE_LINES]; 2],
) {
    let ms = header.ms_stereo();
    let intensity = header.intensity_stereo();
    if !ms && !intensity {
        return;
    }

    // Highest band holding a nonzero right-channel line, per window
    let mut long_last: Option<usize> = None;
    let mut short_last: [Option<usize>; 3] = [None; 3];
    if intensity {
        for band in bands(header, right) {
            if xr[1][band.start..band.end].iter().any(|&x| x != 0.0) {
                match band.window {
                    None => long_last = Some(band.sfb),
                    Some(w) => short_last[w] = Some(band.sfb),
                }
            }
        }
    }
    let short_silent = short_last.iter().all(Option::is_none);

    let [left, right_xr] = xr;
    for band in bands(header, right) {
        let gains = intensity
            .then(|| match band.window {
                None if short_silent && long_last.is_none_or(|last| band.sfb > last) => {
                    // Band 21 carries no scalefactor and reuses band 20
                    let sfb = band.sfb.min(20);
                    Some((right_sf.long[sfb], right_sf.long_is_limit[sfb]))
                }
                Some(w) if short_last[w].is_none_or(|last| band.sfb > last) => {
                    let sfb = band.sfb.min(11);
                    Some((right_sf.short[sfb][w], right_sf.short_is_limit[sfb]))
                }
                _ => None,
            })
            .flatten()
            .filter(|&(position, limit)| position < limit)
            .map(|(position, _)| intensity_gains(header, position, right.scalefac_compress));

        let range = band.start..band.end;
        match gains {
            Some((kl, kr)) => {
                for (l, r) in left[range.clone()].iter_mut().zip(&mut right_xr[range]) {
                    let source = *l;
                    *l = source * kl;
                    *r = source * kr;
                }
            }
            None if ms => {
                for (l, r) in left[range.clone()].iter_mut().zip(&mut right_xr[range]) {
                    let (mid, side) = (*l, *r);
                    *l = (mid + side) * FRAC_1_SQRT_2;
                    *r = (mid - side) * FRAC_1_SQRT_2;
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{INTENSITY_HEADER, long_granule};
    use crate::utils::tables::SFB_LONG;

    #[test]
    fn mid_side_only() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFFB_9064)?;
        assert!(header.ms_stereo() && !header.intensity_stereo());

        let mut xr = [[0.0; GRANULE_LINES]; 2];
        xr[0][0] = 1.0;
        xr[1][0] = 1.0;
        xr[0][575] = 2.0;
        process_stereo(&header, &long_granule(0, 0, 0), &ScaleFactors::default(), &mut xr);

        assert!((xr[0][0] - 2.0 * FRAC_1_SQRT_2).abs() < 1e-12);
        assert!(xr[1][0].abs() < 1e-12);
        assert!((xr[1][575] - 2.0 * FRAC_1_SQRT_2).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn intensity_above_last_nonzero_band() -> anyhow::Result<()> {
        let header = FrameHeader::parse(INTENSITY_HEADER)?;
        let long = &SFB_LONG[header.sfb_table_index()];

        let mut sf = ScaleFactors::default();
        sf.long[3] = 0;
        sf.long[4] = 6;
        sf.long[5] = 7;
        sf.long[6] = 3;

        let mut xr = [[1.0; GRANULE_LINES]; 2];
        // right channel is silent above band 2
        for x in &mut xr[1][long[3]..] {
            *x = 0.0;
        }
        process_stereo(&header, &long_granule(0, 0, 0), &sf, &mut xr);

        // below the boundary nothing changes without mid/side
        assert_eq!(xr[0][long[2]], 1.0);
        assert_eq!(xr[1][long[2]], 1.0);
        // position 0: everything right
        assert_eq!(xr[0][long[3]], 0.0);
        assert_eq!(xr[1][long[3]], 1.0);
        // position 6: everything left
        assert_eq!(xr[0][long[4]], 1.0);
        assert_eq!(xr[1][long[4]], 0.0);
        // position 7 is illegal: untouched
        assert_eq!(xr[0][long[5]], 1.0);
        assert_eq!(xr[1][long[5]], 0.0);
        // position 3: equal split
        assert!((xr[0][long[6]] - 0.5).abs() < 1e-12);
        assert!((xr[1][long[6]] - 0.5).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn lsf_intensity_ratios() -> anyhow::Result<()> {
        let header = FrameHeader::parse(0xFFF3_9054)?;
        let quarter = (-0.25f64).exp2();

        assert_eq!(intensity_gains(&header, 0, 0), (1.0, 1.0));
        let (kl, kr) = intensity_gains(&header, 3, 0);
        assert!((kl - quarter * quarter).abs() < 1e-12);
        assert_eq!(kr, 1.0);
        let (kl, kr) = intensity_gains(&header, 2, 1);
        assert_eq!(kl, 1.0);
        assert!((kr - FRAC_1_SQRT_2).abs() < 1e-12);

        Ok(())
    }
}
