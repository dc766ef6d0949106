use std::io::Read;

use log::Level;

use crate::process::extract::{BitReader, Frame};
use crate::process::hybrid::{HybridSynthesis, SUBBAND_LINES, SUBBANDS, SubbandBlock, reduce_aliases};
use crate::process::requantize::{GRANULE_LINES, read_spectrum, reorder, requantize};
use crate::process::stereo::process_stereo;
use crate::process::synthesis::SynthesisFilterBank;
use crate::process::{FrameWarning, PcmSink};
use crate::structs::scalefactors::ScaleFactors;
use crate::structs::side_info::SideInfo;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::FRAME_CRC;
use crate::utils::errors::DecodeError;
use crate::warn_or_err;

/// Where the frame decoder stands within the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecoderPhase {
    #[default]
    AwaitingHeader,
    ReadingSideInfo,
    ReadingMainData,
    Reconstructing,
    Emitting,
    /// The last frame was discarded; the next one starts from a fresh sync.
    Faulted,
}

/// Per-frame state machine from side information to PCM.
///
/// Owns the overlap history of both channels; the synthesis banks and the
/// PCM sink are lent to it for each frame.
#[derive(Debug)]
pub struct FrameDecoder {
    phase: DecoderPhase,
    hybrid: [HybridSynthesis; 2],
    /// Granule 0 scalefactors, reused by MPEG-1 granule 1 through `scfsi`.
    scalefactors: [ScaleFactors; 2],

    pub(crate) fail_level: Level,
    pub(crate) warnings: Vec<FrameWarning>,
    verify_crc: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Level::Error, true)
    }
}

/// Spectral working set of one granule.
struct Granule {
    values: [[i32; GRANULE_LINES]; 2],
    xr: [[f64; GRANULE_LINES]; 2],
    subbands: [SubbandBlock; 2],
}

impl Default for Granule {
    fn default() -> Self {
        Self {
            values: [[0; GRANULE_LINES]; 2],
            xr: [[0.0; GRANULE_LINES]; 2],
            subbands: [[[0.0; SUBBANDS]; SUBBAND_LINES]; 2],
        }
    }
}

impl FrameDecoder {
    /// `fail_level` decides which warnings abort the frame: a warning whose
    /// level is at or above it (in `log` severity order) becomes an error.
    pub fn new(fail_level: Level, verify_crc: bool) -> Self {
        Self {
            phase: DecoderPhase::AwaitingHeader,
            hybrid: Default::default(),
            scalefactors: Default::default(),
            fail_level,
            warnings: Vec::new(),
            verify_crc,
        }
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn set_verify_crc(&mut self, verify: bool) {
        self.verify_crc = verify;
    }

    pub fn phase(&self) -> DecoderPhase {
        self.phase
    }

    /// Clears the overlap history, as at stream start or after losing sync.
    pub fn reset(&mut self) {
        self.hybrid.iter_mut().for_each(HybridSynthesis::reset);
        self.scalefactors = Default::default();
        self.phase = DecoderPhase::AwaitingHeader;
    }

    /// Decodes one extracted frame and emits its PCM through `sink`.
    ///
    /// `reader` must have produced `frame` with its last
    /// [`next_frame`](BitReader::next_frame) call; the frame's main data is
    /// located through its reservoir. `banks` holds one filter bank per
    /// channel of the frame.
    ///
    /// Returns the warnings collected while decoding. On error nothing has
    /// been emitted and the decoder is left [`DecoderPhase::Faulted`].
    pub fn decode_frame<R: Read, S: PcmSink + ?Sized>(
        &mut self,
        reader: &mut BitReader<R>,
        frame: &Frame,
        banks: &mut [SynthesisFilterBank],
        sink: &mut S,
    ) -> Result<Vec<FrameWarning>, DecodeError> {
        self.warnings.clear();

        match self.decode_inner(reader, frame, banks, sink) {
            Ok(()) => {
                self.phase = DecoderPhase::AwaitingHeader;
                Ok(std::mem::take(&mut self.warnings))
            }
            Err(e) => {
                self.phase = DecoderPhase::Faulted;
                Err(e)
            }
        }
    }

    fn decode_inner<R: Read, S: PcmSink + ?Sized>(
        &mut self,
        reader: &mut BitReader<R>,
        frame: &Frame,
        banks: &mut [SynthesisFilterBank],
        sink: &mut S,
    ) -> Result<(), DecodeError> {
        let header = &frame.header;
        let channels = header.channel_count();
        if banks.len() < channels {
            return Err(DecodeError::InvalidSideInfo("missing synthesis filter bank"));
        }

        self.phase = DecoderPhase::ReadingSideInfo;
        self.check_crc(frame)?;

        let side_info = SideInfo::read(header, &mut BsIoSliceReader::from_slice(frame.side_info()))
            .map_err(|e| match e {
                DecodeError::Io(_) => DecodeError::InvalidSideInfo("truncated side information"),
                e => e,
            })?;

        self.phase = DecoderPhase::ReadingMainData;
        reader.set_position_relative(side_info.main_data_begin as usize)?;
        let main_data = reader.main_data();
        if side_info.main_data_bits(header) > main_data.len() * 8 {
            return Err(DecodeError::InvalidSideInfo("part2_3_length exceeds the main data"));
        }

        // Reconstruct everything before emitting anything
        let mut granules: [Granule; 2] = Default::default();
        let bits = &mut BsIoSliceReader::from_slice(main_data);
        let mut part2_start = 0;

        for (index, granule) in granules[..header.granule_count()].iter_mut().enumerate() {
            self.phase = DecoderPhase::ReadingMainData;
            let mut sf: [ScaleFactors; 2] = Default::default();

            for ch in 0..channels {
                let gr = &side_info.granules[index][ch];
                let part3_end = part2_start + gr.part2_3_length as u64;
                bits.seek_to(part2_start)?;

                let scalefactors = if header.is_mpeg1() {
                    ScaleFactors::read_mpeg1(bits, gr, &side_info.scfsi[ch], index, &self.scalefactors[ch])
                } else {
                    ScaleFactors::read_lsf(bits, header, gr, ch)
                };
                // Scalefactors must fit inside part2_3_length, else the channel stays silent
                sf[ch] = match scalefactors {
                    Ok(factors) if bits.position()? <= part3_end => factors,
                    _ => {
                        warn_or_err!(
                            self,
                            Level::Warn,
                            DecodeError::HuffmanDecodeOverrun {
                                granule: index,
                                channel: ch,
                            }
                        );
                        part2_start = part3_end;
                        continue;
                    }
                };

                let result = read_spectrum(bits, gr, part3_end, &mut granule.values[ch])?;
                if result.overrun {
                    warn_or_err!(
                        self,
                        Level::Warn,
                        DecodeError::HuffmanDecodeOverrun {
                            granule: index,
                            channel: ch,
                        }
                    );
                }

                requantize(header, gr, &sf[ch], &granule.values[ch], result.nonzero_end, &mut granule.xr[ch]);
                part2_start = part3_end;
            }

            self.phase = DecoderPhase::Reconstructing;
            if channels == 2 {
                process_stereo(header, &side_info.granules[index][1], &sf[1], &mut granule.xr);
            }

            for ch in 0..channels {
                let gr = &side_info.granules[index][ch];
                reorder(header, gr, &mut granule.xr[ch]);
                reduce_aliases(gr, &mut granule.xr[ch]);
                self.hybrid[ch].process(gr, &granule.xr[ch], &mut granule.subbands[ch]);
            }

            if index == 0 {
                self.scalefactors = sf;
            }
        }

        self.phase = DecoderPhase::Emitting;
        sink.start_frame(channels as u8);
        for granule in &granules[..header.granule_count()] {
            for slot in 0..SUBBAND_LINES {
                for (ch, bank) in banks[..channels].iter_mut().enumerate() {
                    let pcm = bank.push_block(&granule.subbands[ch][slot]);
                    sink.emit_samples(ch as u8, &pcm);
                }
            }
        }

        Ok(())
    }

    fn check_crc(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Some(read) = frame.crc() else {
            return Ok(());
        };
        if !self.verify_crc {
            return Ok(());
        }

        let calculated = FRAME_CRC.frame_checksum(&frame.as_ref()[2..4], frame.side_info());
        if calculated != read {
            warn_or_err!(self, Level::Warn, DecodeError::CrcMismatch { calculated, read });
        }

        Ok(())
    }
}
