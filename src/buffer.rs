// Growable byte sink backing the display paths.
//
// Output is accumulated as raw bytes and drained to an owned String
// in one step, so partial writes never reach the console.

use std::fmt::{self, Write};

const DEFAULT_CAPACITY: usize = 64;

pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> ByteBuffer {
        ByteBuffer::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> ByteBuffer {
        ByteBuffer { bytes: Vec::with_capacity(capacity) }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    // Append raw bytes, growing by doubling when the spare capacity
    // runs out. Returns the number of bytes written.
    pub fn append(&mut self, content: &[u8]) -> usize {
        self.ensure(content.len());
        self.bytes.extend_from_slice(content);
        content.len()
    }

    // Append the rendering of a format_args! invocation.
    pub fn append_fmt(&mut self, args: fmt::Arguments) -> usize {
        let before = self.bytes.len();
        // Writing into a Vec<u8> through fmt::Write cannot fail.
        self.write_fmt(args).ok();
        self.bytes.len() - before
    }

    // Append at most `limit` bytes of `content`.
    pub fn append_limited(&mut self, limit: usize, content: &[u8]) -> usize {
        let end = content.len().min(limit);
        self.append(&content[..end])
    }

    // Take the accumulated bytes as an owned String, leaving the
    // buffer empty. Invalid UTF-8 is replaced, never propagated.
    pub fn drain(&mut self) -> String {
        let bytes = std::mem::replace(&mut self.bytes, Vec::new());
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    fn ensure(&mut self, extra: usize) {
        let spare = self.bytes.capacity() - self.bytes.len();
        if extra <= spare {
            return;
        }

        let wanted = self.bytes.len() + extra;
        let doubled = if self.bytes.capacity() < wanted {
            wanted * 2
        } else {
            self.bytes.capacity() * 2
        };

        self.bytes.reserve_exact(doubled - self.bytes.len());
    }
}

impl Write for ByteBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s.as_bytes());
        Ok(())
    }
}
