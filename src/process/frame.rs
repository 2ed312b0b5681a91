use std::borrow::Cow;
use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Smallest number of bytes a single frame read may request
pub const MIN_FRAME_SIZE: usize = 1024;

/// Which output stream of a process a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Outcome of a single read that is handed to a callback
#[derive(Debug)]
pub enum FrameRead<'a> {
    /// Bytes returned by the read
    Data(&'a [u8]),
    /// The read failed with something other than end-of-stream
    Failed(&'a io::Error),
}

/// One chunk of bytes read from a process stream.
///
/// A frame is whatever a single read returned: it may end in the middle of a
/// line, hold several lines, or hold none at all.
#[derive(Debug)]
pub struct Frame<'a> {
    stream: StreamKind,
    times: usize,
    read: FrameRead<'a>,
}

impl<'a> Frame<'a> {
    /// Create a frame carrying data
    pub fn data(stream: StreamKind, times: usize, bytes: &'a [u8]) -> Self {
        Self {
            stream,
            times,
            read: FrameRead::Data(bytes),
        }
    }

    /// Create a frame carrying a read error
    pub fn failed(stream: StreamKind, times: usize, error: &'a io::Error) -> Self {
        Self {
            stream,
            times,
            read: FrameRead::Failed(error),
        }
    }

    /// 1-based index of the read on its own stream
    pub fn times(&self) -> usize {
        self.times
    }

    /// Stream the frame was read from
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// The raw read outcome
    pub fn read(&self) -> &FrameRead<'a> {
        &self.read
    }

    /// The bytes of the frame, or `None` for a failed read
    pub fn bytes(&self) -> Option<&'a [u8]> {
        match self.read {
            FrameRead::Data(bytes) => Some(bytes),
            FrameRead::Failed(_) => None,
        }
    }

    /// Number of bytes in the frame (0 for a failed read)
    pub fn size(&self) -> usize {
        self.bytes().map_or(0, <[u8]>::len)
    }

    /// The read error, if this frame carries one
    pub fn error(&self) -> Option<&'a io::Error> {
        match self.read {
            FrameRead::Data(_) => None,
            FrameRead::Failed(error) => Some(error),
        }
    }

    /// Lossy UTF-8 view of the frame bytes
    pub fn text(&self) -> Option<Cow<'a, str>> {
        self.bytes().map(String::from_utf8_lossy)
    }
}

/// Reads a stream one frame at a time.
///
/// The reader knows nothing about lines or termination; it just fills its
/// buffer with whatever the next read returns.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader returning at most `frame_size` bytes per read.
    /// Sizes below [`MIN_FRAME_SIZE`] are raised to it.
    pub fn new(inner: R, frame_size: usize) -> Self {
        let frame_size = frame_size.max(MIN_FRAME_SIZE);
        Self {
            inner: BufReader::with_capacity(frame_size, inner),
            buf: vec![0; frame_size],
        }
    }

    /// Maximum number of bytes returned per read
    pub fn frame_size(&self) -> usize {
        self.buf.len()
    }

    /// Read the next frame and return its length; 0 means end-of-stream.
    ///
    /// Cancel safe: dropping the future before completion loses no data.
    pub async fn read_frame(&mut self) -> io::Result<usize> {
        self.inner.read(&mut self.buf).await
    }

    /// Bytes of the most recent frame of length `len`
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.buf.len())]
    }
}
