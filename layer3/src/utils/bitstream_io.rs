//! Bit-level reading over byte slices.
//!
//! Side information and main data are parsed MSB-first through
//! [`BitstreamIoReader`], a bounds-aware wrapper around `bitstream_io`.

use std::io;
use std::io::SeekFrom;

use bitstream_io::huffman::FromBits;
use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        // Zero-width fields show up in scalefactor partitions
        if n == 0 {
            return Ok(I::ZERO);
        }

        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn read_huffman<T: FromBits>(&mut self) -> io::Result<T::Symbol> {
        self.bs.read_huffman::<T>()
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    /// Moves to an absolute bit position inside the buffer.
    #[inline(always)]
    pub fn seek_to(&mut self, position: u64) -> io::Result<u64> {
        if position > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("seek_to({position}): beyond {} bits", self.len),
            ));
        }

        self.bs.seek_bits(SeekFrom::Start(position))
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ));
        }

        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    /// Total length of the underlying buffer in bits.
    #[inline(always)]
    pub fn len_bits(&self) -> u64 {
        self.len
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

#[test]
fn reads_msb_first() -> anyhow::Result<()> {
    let reader = &mut BsIoSliceReader::from_slice(&[0b1011_0010, 0xFF]);

    assert!(reader.get()?);
    assert_eq!(reader.get_n::<u8>(3)?, 0b011);
    assert_eq!(reader.get_n::<u16>(0)?, 0);
    assert_eq!(reader.get_n::<u16>(8)?, 0b0010_1111);
    assert_eq!(reader.available()?, 4);

    Ok(())
}

#[test]
fn bounds_are_reported_as_eof() -> anyhow::Result<()> {
    let reader = &mut BsIoSliceReader::from_slice(&[0xAA]);

    reader.skip_n(6)?;
    let err = reader.get_n::<u8>(4).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

    assert!(reader.seek_to(9).is_err());
    assert_eq!(reader.seek_to(2)?, 2);
    assert!(reader.seek(-3).is_err());

    Ok(())
}
