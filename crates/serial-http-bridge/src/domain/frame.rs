//! Frames, delimiters, and the frame accumulation buffer.
//!
//! A serial port is a *stream*: one read may return half a line, or three
//! lines at once.  [`FrameBuffer`] collects raw bytes as they arrive and cuts
//! them into [`Frame`]s at each occurrence of the configured [`Delimiter`].
//!
//! Everything here is pure; the async read loop that feeds the buffer lives
//! in `infrastructure::serial_link`.

use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

// ── Delimiter ─────────────────────────────────────────────────────────────────

/// Non-empty byte sequence marking the end of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter(Vec<u8>);

impl Delimiter {
    /// Wraps `bytes` as a delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDelimiter`] if `bytes` is empty.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        Ok(Self(bytes))
    }

    /// Parses a delimiter given on the command line.
    ///
    /// Backslash escapes are decoded so that control characters can be typed
    /// in a shell: `\n`, `\r`, `\t`, `\0`, `\\` and `\xHH`.  Any other
    /// character stands for its own UTF-8 encoding.
    ///
    /// ```rust
    /// use serial_http_bridge::domain::Delimiter;
    ///
    /// let crlf = Delimiter::parse_escaped(r"\r\n").unwrap();
    /// assert_eq!(crlf.as_bytes(), b"\r\n");
    /// ```
    pub fn parse_escaped(text: &str) -> Result<Self, ConfigError> {
        let mut out = Vec::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                continue;
            }

            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('r') => out.push(b'\r'),
                Some('t') => out.push(b'\t'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some('x') => {
                    let hex: String = chars.by_ref().take(2).collect();
                    let byte = (hex.len() == 2)
                        .then(|| u8::from_str_radix(&hex, 16).ok())
                        .flatten()
                        .ok_or_else(|| ConfigError::InvalidEscape(format!("\\x{hex}")))?;
                    out.push(byte);
                }
                Some(other) => return Err(ConfigError::InvalidEscape(format!("\\{other}"))),
                None => return Err(ConfigError::InvalidEscape("trailing '\\'".to_string())),
            }
        }

        Self::new(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

}

impl Default for Delimiter {
    /// A single linefeed.
    fn default() -> Self {
        Self(vec![b'\n'])
    }
}

impl FromStr for Delimiter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_escaped(s)
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One unit of bytes read from the device.
///
/// A complete frame ends with the delimiter.  A *partial* frame is what was
/// left in the buffer when the stream ended without a final delimiter.  A
/// *truncated* frame is the first `max_len` bytes of a run that never
/// contained a delimiter within the length limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    end: FrameEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameEnd {
    Delimiter,
    EndOfStream,
    LengthLimit,
}

impl Frame {
    pub fn complete(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            end: FrameEnd::Delimiter,
        }
    }

    pub fn partial(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            end: FrameEnd::EndOfStream,
        }
    }

    pub fn truncated(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            end: FrameEnd::LengthLimit,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` if the stream ended before a delimiter was seen.
    pub fn is_partial(&self) -> bool {
        self.end == FrameEnd::EndOfStream
    }

    /// `true` if the frame was cut at the length limit.
    pub fn is_truncated(&self) -> bool {
        self.end == FrameEnd::LengthLimit
    }
}

impl fmt::Display for Frame {
    /// Renders the bytes with non-printable characters escaped, for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes.escape_ascii())
    }
}

// ── FrameBuffer ───────────────────────────────────────────────────────────────

/// Accumulates raw bytes and splits them into delimiter-terminated frames.
///
/// `scanned` remembers how far the previous search got so that bytes are not
/// searched again on every push.  It stops `delimiter.len() - 1` bytes short
/// of the end, because a delimiter may straddle two reads.
///
/// The buffer never holds more than `max_len` bytes without handing some of
/// them out: a device that never sends the delimiter yields truncated frames
/// instead of growing memory.
#[derive(Debug)]
pub struct FrameBuffer {
    delimiter: Delimiter,
    buf: Vec<u8>,
    scanned: usize,
    max_len: usize,
}

/// Default frame length limit (64 KiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

impl FrameBuffer {
    pub fn new(delimiter: Delimiter) -> Self {
        Self::with_max_len(delimiter, DEFAULT_MAX_FRAME_LEN)
    }

    /// `max_len` is clamped to at least the delimiter length.
    pub fn with_max_len(delimiter: Delimiter, max_len: usize) -> Self {
        let max_len = max_len.max(delimiter.as_bytes().len());
        Self {
            delimiter,
            buf: Vec::with_capacity(max_len.min(4096)),
            scanned: 0,
            max_len,
        }
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Removes and returns the next complete frame, delimiter included.
    ///
    /// If no delimiter ends within the first `max_len` bytes and at least
    /// that many are buffered, those bytes come out as a truncated frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        let delim = self.delimiter.as_bytes();

        let found = self.buf[self.scanned..]
            .windows(delim.len())
            .position(|window| window == delim);

        if let Some(offset) = found {
            let end = self.scanned + offset + delim.len();
            if end <= self.max_len {
                let bytes: Vec<u8> = self.buf.drain(..end).collect();
                self.scanned = 0;
                return Some(Frame::complete(bytes));
            }
        }

        if self.buf.len() >= self.max_len {
            let bytes: Vec<u8> = self.buf.drain(..self.max_len).collect();
            self.scanned = 0;
            return Some(Frame::truncated(bytes));
        }

        self.scanned = self.buf.len().saturating_sub(delim.len() - 1);
        None
    }

    /// Drains whatever is left as a partial frame.  Called once the stream
    /// has ended; returns `None` if nothing was buffered.
    pub fn finish(&mut self) -> Option<Frame> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        Some(Frame::partial(std::mem::take(&mut self.buf)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
