use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: BufReader<Box<dyn Read + Send>>,
    is_pipe: bool,
    bytes_read: u64,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let input_path = input_path.as_ref();
        let is_pipe = is_stdin(input_path);

        let source: Box<dyn Read + Send> = if is_pipe {
            Box::new(io::stdin())
        } else {
            let file = File::open(input_path)
                .with_context(|| format!("Failed to open {}", input_path.display()))?;
            Box::new(file)
        };

        Ok(Self {
            reader: BufReader::with_capacity(64 * 1024, source),
            is_pipe,
            bytes_read: 0,
        })
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

pub fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}
