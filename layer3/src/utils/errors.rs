use std::io;

/// Returns `$err` when `$level` reaches the configured fail level, otherwise
/// records it as a warning on the frame being decoded.
#[macro_export]
macro_rules! warn_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        let error = $err;
        if $level <= $state.fail_level {
            return Err(error);
        }
        $state.warnings.push($crate::process::FrameWarning {
            level: $level,
            error,
        });
    }};
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Missing frame sync: header = {0:#010X}")]
    MissingSync(u32),

    #[error("Reserved MPEG version id")]
    ReservedVersion,

    #[error("Reserved layer description")]
    ReservedLayer,

    #[error("Layer {0} is not supported")]
    UnsupportedLayer(u8),

    #[error("Free-format bitrate is not supported")]
    FreeFormat,

    #[error("Forbidden bitrate index 15")]
    ForbiddenBitrate,

    #[error("Reserved sample rate index")]
    ReservedSampleRate,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Input stream exhausted")]
    StreamExhausted,

    #[error("Invalid frame header: {0}")]
    InvalidHeader(#[from] HeaderError),

    #[error("Reservoir underflow: main_data_begin = {requested} bytes, {available} bytes retained")]
    ReservoirUnderflow { requested: usize, available: usize },

    #[error("Huffman data overran part2_3_length in granule {granule}, channel {channel}")]
    HuffmanDecodeOverrun { granule: usize, channel: usize },

    #[error("Stream abandoned after {0} consecutive frame failures")]
    UnrecoverableStream(usize),

    #[error("Invalid side information: {0}")]
    InvalidSideInfo(&'static str),

    #[error("Invalid Huffman table select: {0}")]
    InvalidHuffmanTable(u8),

    #[error("CRC mismatch: calculated {calculated:#06X}, read {read:#06X}")]
    CrcMismatch { calculated: u16, read: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Whether the session can keep decoding after this error.
    ///
    /// Only an exhausted input, a failed source read and an abandoned stream
    /// end the session; every other error discards a single frame.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DecodeError::StreamExhausted | DecodeError::UnrecoverableStream(_) | DecodeError::Io(_)
        )
    }
}

#[test]
fn recoverable_classification() {
    assert!(DecodeError::InvalidHeader(HeaderError::FreeFormat).is_recoverable());
    assert!(
        DecodeError::ReservoirUnderflow {
            requested: 10,
            available: 0
        }
        .is_recoverable()
    );
    assert!(!DecodeError::StreamExhausted.is_recoverable());
    assert!(!DecodeError::UnrecoverableStream(3).is_recoverable());
}
