//! Newline-delimited line encoding/decoding
//!
//! Wire format: UTF-8 text terminated by `\n` (a preceding `\r` is dropped)
//! Maximum line length: 64KiB (sanity limit)

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum allowed line length, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Reads lines from a buffered stream
///
/// [`LineReader::next_line`] is cancel safe: bytes of a partially read line
/// stay buffered and the next call picks up where the last one stopped.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Read the next line, without its terminator
    ///
    /// A line that is not UTF-8 is consumed and reported as
    /// [`Error::InvalidUtf8`]; the reader stays usable afterwards.
    pub async fn next_line(&mut self) -> Result<String> {
        // One byte over the limit is enough to tell an oversized line apart
        let budget = (MAX_LINE_LENGTH + 1).saturating_sub(self.buf.len()) as u64;
        let read = (&mut self.reader)
            .take(budget)
            .read_until(b'\n', &mut self.buf)
            .await?;

        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else if line.len() > MAX_LINE_LENGTH {
            return Err(Error::LineTooLong(line.len()));
        } else if read == 0 && line.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        String::from_utf8(line).map_err(|e| Error::InvalidUtf8(e.utf8_error()))
    }
}

/// Write one line followed by `\n`
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    if line.contains(['\n', '\r']) {
        return Err(Error::Protocol("Line contains a raw newline".into()));
    }
    if line.len() > MAX_LINE_LENGTH {
        return Err(Error::LineTooLong(line.len()));
    }

    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Flush to ensure delivery
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_line_roundtrip() {
        let mut buf = Vec::new();
        write_line(&mut buf, "@3 CHAT \"hello there\"").await.unwrap();
        write_line(&mut buf, "=").await.unwrap();
        assert_eq!(buf, b"@3 CHAT \"hello there\"\n=\n");

        let mut reader = LineReader::new(Cursor::new(buf));
        assert_eq!(reader.next_line().await.unwrap(), "@3 CHAT \"hello there\"");
        assert_eq!(reader.next_line().await.unwrap(), "=");
        assert!(matches!(
            reader.next_line().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_crlf_and_unterminated_last_line() {
        let mut reader = LineReader::new(Cursor::new(b"#4\r\n\n^1".to_vec()));
        assert_eq!(reader.next_line().await.unwrap(), "#4");
        assert_eq!(reader.next_line().await.unwrap(), "");
        assert_eq!(reader.next_line().await.unwrap(), "^1");
        assert!(matches!(
            reader.next_line().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skippable() {
        let mut reader = LineReader::new(Cursor::new(b"* \xff\xfe\n#5\n".to_vec()));
        assert!(matches!(
            reader.next_line().await,
            Err(Error::InvalidUtf8(_))
        ));
        assert_eq!(reader.next_line().await.unwrap(), "#5");
    }

    #[tokio::test]
    async fn test_oversized_line_rejected() {
        let data = vec![b'x'; MAX_LINE_LENGTH + 10];
        let mut reader = LineReader::new(Cursor::new(data));
        assert!(matches!(
            reader.next_line().await,
            Err(Error::LineTooLong(_))
        ));
    }

    #[tokio::test]
    async fn test_embedded_newline_rejected() {
        let mut buf = Vec::new();
        assert!(write_line(&mut buf, "* a\nb").await.is_err());
        assert!(buf.is_empty());
    }
}
