//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, CRC validation, Huffman decoding, fixed lookup
//! tables and error types.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
pub mod huffman;
pub mod tables;
