//! Data structures representing bitstream components.
//!
//! Contains the frame header, the per-frame side information and the
//! per-granule scalefactors read from the start of the main data.

pub mod header;
pub mod scalefactors;
pub mod side_info;
