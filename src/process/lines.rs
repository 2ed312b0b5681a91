use super::frame::Frame;

/// Rebuilds complete lines from frames that do not respect line boundaries.
///
/// Bytes after the last newline of a frame are held back until a later frame
/// completes the line.
#[derive(Debug, Default)]
pub struct LineAssembler {
    /// Bytes of the current, unterminated line
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a frame and return every line it completes, without the newline
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            if self.pending.last() == Some(&b'\r') {
                self.pending.pop();
            }
            lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            rest = &rest[pos + 1..];
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Take the unterminated trailing line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Wrap a per-line handler as a frame callback.
///
/// The handler sees each complete line once; returning `true` stops the
/// watch. Failed reads are skipped. A final line without a newline is not
/// delivered, since watchers do not report end-of-stream to callbacks.
pub fn line_callback<F>(mut handler: F) -> impl FnMut(&Frame<'_>) -> bool + Send + 'static
where
    F: FnMut(&str) -> bool + Send + 'static,
{
    let mut assembler = LineAssembler::new();
    move |frame: &Frame<'_>| {
        let Some(bytes) = frame.bytes() else {
            return false;
        };
        assembler.push(bytes).iter().any(|line| handler(line))
    }
}
