use crate::error::{Result, TsError};
use crate::format::ts::{TSPacket, SYNC_BYTE, TS_PACKET_SIZE};
use crate::format::PacketSource;
use bytes::{Buf, BytesMut};
use log::{debug, info, warn};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

/// Bytes requested from the reader per refill.
const READ_BUFFER_SIZE: usize = TS_PACKET_SIZE * 1000;

/// Packet source over any async byte stream.
///
/// Packet boundaries are found by scanning for the sync byte and accepting a
/// candidate only when another sync byte follows 188 bytes later, or when the
/// stream ends exactly there. Skipped bytes are logged.
pub struct ReaderSource<R: AsyncRead + Unpin + Send> {
    reader: Option<R>,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            eof: false,
        }
    }

    pub fn get_mut(&mut self) -> Result<&mut R> {
        self.reader.as_mut().ok_or(TsError::SourceClosed)
    }

    /// Drops buffered bytes, e.g. after the underlying reader was rewound.
    pub fn discard_buffered(&mut self) {
        self.buffer.clear();
        self.eof = false;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    async fn fill(&mut self, needed: usize) -> Result<()> {
        while self.buffer.len() < needed && !self.eof {
            let reader = self.reader.as_mut().ok_or(TsError::SourceClosed)?;
            self.buffer.reserve(READ_BUFFER_SIZE);
            if reader.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Advances to the next sync byte. Returns false at end of stream.
    async fn seek_sync(&mut self) -> Result<bool> {
        let mut skipped = 0usize;
        let found = loop {
            self.fill(1).await?;
            if self.buffer.is_empty() {
                break false;
            }
            match self.buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(pos) => {
                    skipped += pos;
                    self.buffer.advance(pos);
                    break true;
                }
                None => {
                    skipped += self.buffer.len();
                    self.buffer.clear();
                }
            }
        };
        if skipped > 0 {
            info!("Skipped {} bytes looking for a sync byte", skipped);
        }
        Ok(found)
    }

    async fn read_packet(&mut self) -> Result<Option<TSPacket>> {
        if self.is_closed() {
            return Err(TsError::SourceClosed);
        }

        loop {
            if !self.seek_sync().await? {
                return Ok(None);
            }

            self.fill(TS_PACKET_SIZE + 1).await?;
            if self.buffer.len() < TS_PACKET_SIZE {
                debug!(
                    "Discarding {} trailing bytes shorter than a packet",
                    self.buffer.len()
                );
                self.buffer.clear();
                return Ok(None);
            }

            if self.buffer.len() > TS_PACKET_SIZE && self.buffer[TS_PACKET_SIZE] != SYNC_BYTE {
                debug!("No sync byte after candidate packet, resynchronizing");
                self.buffer.advance(1);
                continue;
            }

            let data = self.buffer.split_to(TS_PACKET_SIZE);
            match TSPacket::from_bytes(data) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => warn!("Dropping unparsable packet: {}", e),
            }
        }
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> PacketSource for ReaderSource<R> {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        self.read_packet().await
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.buffer.clear();
        Ok(())
    }
}

/// Resettable packet source reading a file from disk.
pub struct FileSource {
    path: PathBuf,
    inner: ReaderSource<File>,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        debug!("Opened {}", path.display());
        Ok(Self {
            path,
            inner: ReaderSource::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl PacketSource for FileSource {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        self.inner.read_packet().await
    }

    fn is_resettable(&self) -> bool {
        true
    }

    async fn reset(&mut self) -> Result<()> {
        self.inner.get_mut()?.seek(SeekFrom::Start(0)).await?;
        self.inner.discard_buffered();
        debug!("Rewound {}", self.path.display());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}
