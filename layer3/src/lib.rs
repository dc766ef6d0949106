#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder for MPEG Audio Layer III bitstreams according to ISO/IEC 11172-3
//! and the low sampling frequency extensions of ISO/IEC 13818-3.
//!
//! ### Bitstream Organization
//!
//! **Frames**: a 32-bit header, an optional CRC-16 and the side information
//! at fixed positions, followed by main data.
//! **Main data**: scalefactors and Huffman-coded spectra of each granule and
//! channel. A frame's main data may begin in earlier frames (the bit
//! reservoir), up to `main_data_begin` bytes back.
//!
//! ### Decoding Pipeline
//!
//! - Huffman decoding of big values and count1 quadruples
//! - Requantization with global gain, subblock gain and scalefactors
//! - Mid/side and intensity stereo
//! - Short block reordering and alias reduction
//! - IMDCT with block-type windows and overlap-add
//! - Polyphase synthesis into 32 PCM samples per step
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layer3::process::InterleavedBuffer;
//! use layer3::process::stream::StreamDecoder;
//!
//! let mut decoder = StreamDecoder::default();
//! decoder.push_bytes(&std::fs::read("clip.mp3")?);
//!
//! let mut pcm = InterleavedBuffer::new(2);
//! while let Some(report) = decoder.decode_frame(&mut pcm)? {
//!     for warning in &report.warnings {
//!         eprintln!("{}: {warning}", report.header);
//!     }
//! }
//!
//! let samples = pcm.take();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Processing stages of the decoder.
///
/// 1. **Frame Extraction** ([`process::extract`]): sync search, frame
///    extraction and the bit reservoir.
///
/// 2. **Frame Decoding** ([`process::decode`]): side information, main data
///    and spectral reconstruction.
///
/// 3. **Synthesis** ([`process::synthesis`]): subband samples to PCM.
///
/// 4. **Sessions** ([`process::stream`]): failure accounting, resync and
///    cancellation over a whole stream.
pub mod process;

/// Data structures representing Layer III bitstream components.
///
/// - **Frame Header** ([`structs::header`])
/// - **Side Information** ([`structs::side_info`])
/// - **Scalefactors** ([`structs::scalefactors`])
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Huffman Tables** ([`utils::huffman`]): Spectral value decoding
/// - **Lookup Tables** ([`utils::tables`]): Bitrates, band boundaries, synthesis window
pub mod utils;
