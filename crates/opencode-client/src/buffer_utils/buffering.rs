use std::collections::VecDeque;

/// Circular buffer for line-based parsing of a byte stream
/// Uses VecDeque so complete lines drain from the front without shifting
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
}

impl CircularLineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n) from buffer, without the terminator
    /// Returns None if no complete line is available
    ///
    /// A trailing `\r` is stripped; other whitespace is kept since it can be
    /// significant inside SSE data. Invalid UTF-8 is replaced, not rejected.
    pub fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;

        let mut line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }

        Some(String::from_utf8_lossy(&line_bytes).into_owned())
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_buffer_basic() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"line1\nline2\r\n\n");

        assert_eq!(buffer.next_line().unwrap(), "line1");
        assert_eq!(buffer.next_line().unwrap(), "line2");
        assert_eq!(buffer.next_line().unwrap(), "");
        assert!(buffer.next_line().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"partial");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.len(), 7);

        buffer.extend(b" line\n");
        assert_eq!(buffer.next_line().unwrap(), "partial line");
    }

    #[test]
    fn test_keeps_inner_whitespace() {
        let mut buffer = CircularLineBuffer::with_capacity(64);
        buffer.extend(b"data:  padded  \n");
        assert_eq!(buffer.next_line().unwrap(), "data:  padded  ");
    }

    #[test]
    fn test_split_multibyte_char() {
        let mut buffer = CircularLineBuffer::with_capacity(64);
        let bytes = "héllo\n".as_bytes();
        buffer.extend(&bytes[..2]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&bytes[2..]);
        assert_eq!(buffer.next_line().unwrap(), "héllo");
    }
}
