//! On-disk encodings for spool files
//!
//! `Gzip` bodies are a single RFC 1952 member: a fixed 10-byte header, a raw
//! deflate stream from a pooled encoder, then CRC32 and ISIZE of the
//! uncompressed input. `Text` bodies are the lines as written.

use flate2::Crc;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use crate::util::{CompressorPool, FileSink, PooledCompressor};
use spillway_config::FileType;

/// Magic, CM=deflate, no flags, no mtime, no XFL, OS=unknown
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

pub(super) enum FileBody {
    Text(FileSink),
    Gzip(GzipBody),
}

impl FileBody {
    pub(super) fn open(
        file: File,
        file_type: FileType,
        pool: &Arc<CompressorPool>,
    ) -> io::Result<Self> {
        match file_type {
            FileType::Text => Ok(Self::Text(FileSink::new(file))),
            FileType::Gzip => GzipBody::open(file, pool).map(Self::Gzip),
        }
    }

    /// Append `line` and a trailing newline
    pub(super) fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self {
            Self::Text(sink) => {
                sink.write_all(line)?;
                sink.write_all(b"\n")
            }
            Self::Gzip(body) => body.write_line(line),
        }
    }

    /// Bytes on disk so far; flushes first so the count is current
    pub(super) fn size(&mut self) -> io::Result<u64> {
        match self {
            Self::Text(sink) => {
                sink.flush()?;
                Ok(sink.bytes_written())
            }
            Self::Gzip(body) => body.size(),
        }
    }

    /// Complete the encoding and flush everything to the file
    pub(super) fn finish(self) -> io::Result<()> {
        let file = match self {
            Self::Text(sink) => sink.into_file()?,
            Self::Gzip(body) => body.finish()?,
        };
        if let Some(file) = file {
            file.sync_data()?;
        }
        Ok(())
    }
}

pub(super) struct GzipBody {
    /// Always `Some` until dropped; returned to the pool on drop
    encoder: Option<PooledCompressor>,
    crc: Crc,
    pool: Arc<CompressorPool>,
}

impl GzipBody {
    fn open(file: File, pool: &Arc<CompressorPool>) -> io::Result<Self> {
        let mut sink = FileSink::new(file);
        sink.write_all(&GZIP_HEADER)?;

        let mut encoder = pool.acquire();
        *encoder.get_mut() = sink;

        Ok(Self {
            encoder: Some(encoder),
            crc: Crc::new(),
            pool: Arc::clone(pool),
        })
    }

    fn encoder(&mut self) -> io::Result<&mut PooledCompressor> {
        self.encoder
            .as_mut()
            .ok_or_else(|| io::Error::other("gzip body already released"))
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let encoder = self.encoder()?;
        encoder.write_all(line)?;
        encoder.write_all(b"\n")?;
        self.crc.update(line);
        self.crc.update(b"\n");
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        let encoder = self.encoder()?;
        // sync flush: pending deflate output reaches the file
        encoder.flush()?;
        Ok(encoder.get_ref().bytes_written())
    }

    fn finish(mut self) -> io::Result<Option<File>> {
        let mut sink = self.encoder()?.reset(FileSink::discard())?;
        sink.write_all(&self.crc.sum().to_le_bytes())?;
        sink.write_all(&self.crc.amount().to_le_bytes())?;
        sink.into_file()
    }
}

impl Drop for GzipBody {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.pool.release(encoder);
        }
    }
}
