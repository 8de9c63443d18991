use bytes::Bytes;
use rdt_abstract::{BlockSink, BlockSource, MAX_PAYLOAD};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

pub const BLOCK_SIZE: usize = MAX_PAYLOAD;

pub fn block_count(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64)
}

/// Byte range of block `index` in a file of `len` bytes. The block right
/// after the last one is the empty end marker.
fn block_range(index: u64, len: u64) -> io::Result<Range<u64>> {
    let count = block_count(len);
    if index > count {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block {index} out of range, file has {count} blocks"),
        ));
    }
    let start = (index * BLOCK_SIZE as u64).min(len);
    let end = (start + BLOCK_SIZE as u64).min(len);
    Ok(start..end)
}

#[derive(Debug)]
pub struct FileBlockReader {
    file: File,
    len: u64,
}

impl FileBlockReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl BlockSource for FileBlockReader {
    fn block_count(&self) -> u64 {
        block_count(self.len)
    }

    fn block(&mut self, index: u64) -> io::Result<Bytes> {
        let range = block_range(index, self.len)?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        self.file.seek(SeekFrom::Start(range.start))?;
        self.file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBlockSource {
    data: Bytes,
}

impl MemoryBlockSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl BlockSource for MemoryBlockSource {
    fn block_count(&self) -> u64 {
        block_count(self.data.len() as u64)
    }

    fn block(&mut self, index: u64) -> io::Result<Bytes> {
        let range = block_range(index, self.data.len() as u64)?;
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

/// Buffered file sink. Call [`FileBlockWriter::finish`] to surface flush
/// errors.
#[derive(Debug)]
pub struct FileBlockWriter {
    inner: BufWriter<File>,
}

impl FileBlockWriter {
    /// Create or truncate.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            inner: BufWriter::new(File::create(path)?),
        })
    }

    pub fn append_to(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BlockSink for FileBlockWriter {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)
    }
}
