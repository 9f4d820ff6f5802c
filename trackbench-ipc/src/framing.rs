//! Frames
//!
//! A frame is a 4-byte little-endian payload length followed by an rkyv
//! archive. The writer assembles header and payload in one buffer and hands
//! it to the pipe with a single `write_all`. [`FrameReader`] blocks until a
//! whole frame has arrived; [`FrameAssembler`] is fed whatever a
//! non-blocking read returned and hands frames out once they are complete.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{self, BufReader, Read, Write};
use thiserror::Error;

/// Largest payload accepted in either direction
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Errors while exchanging frames
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Frame of {len} bytes exceeds the {max} byte limit", max = MAX_FRAME_SIZE)]
    TooLarge { len: usize },

    #[error("Empty frame")]
    Empty,

    #[error("Stream ended {received} bytes into a {expected} byte frame")]
    Truncated { expected: usize, received: usize },

    /// The peer closed the stream on a frame boundary
    #[error("End of stream")]
    EndOfStream,
}

/// Writes whole frames to a pipe or file
pub struct FrameWriter<W: Write> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode `message`, write it as one frame and flush
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        let payload =
            rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Encode(e.to_string()))?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge { len: payload.len() });
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Reads frames written by [`FrameWriter`]
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(16 * 1024, inner),
        }
    }

    /// Read and decode the next frame
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut header = [0u8; HEADER_LEN];
        match self.fill(&mut header)? {
            0 => return Err(FrameError::EndOfStream),
            HEADER_LEN => {}
            received => {
                return Err(FrameError::Truncated {
                    expected: HEADER_LEN,
                    received,
                });
            }
        }

        let len = payload_len(header)?;

        // check_archived_root needs an aligned buffer
        let mut payload = AlignedVec::with_capacity(len);
        payload.resize(len, 0);
        let received = self.fill(&mut payload)?;
        if received < len {
            return Err(FrameError::Truncated {
                expected: len,
                received,
            });
        }

        decode(&payload)
    }

    /// Read until `buf` is full or the stream ends; returns the bytes read
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Collects bytes from a non-blocking stream and cuts them into frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<u8>,
}

impl FrameAssembler {
    /// Start with nothing buffered
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes as they came off the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Decode the next frame, or `None` until all of its bytes are in
    pub fn next_frame<T>(&mut self) -> Result<Option<T>, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        if self.pending.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.pending[..HEADER_LEN]);
        let len = payload_len(header)?;
        let end = HEADER_LEN + len;
        if self.pending.len() < end {
            return Ok(None);
        }

        let mut payload = AlignedVec::with_capacity(len);
        payload.extend_from_slice(&self.pending[HEADER_LEN..end]);
        self.pending.drain(..end);
        decode(&payload).map(Some)
    }

    /// Check that the stream ended on a frame boundary
    pub fn finish(&self) -> Result<(), FrameError> {
        let held = self.pending.len();
        if held == 0 {
            return Ok(());
        }
        if held < HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                received: held,
            });
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.pending[..HEADER_LEN]);
        Err(FrameError::Truncated {
            expected: u32::from_le_bytes(header) as usize,
            received: held - HEADER_LEN,
        })
    }
}

fn payload_len(header: [u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge { len });
    }
    Ok(len)
}

fn decode<T>(payload: &[u8]) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let archived =
        rkyv::check_archived_root::<T>(payload).map_err(|e| FrameError::Decode(e.to_string()))?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Decode("archive could not be rebuilt".to_string()))
}
