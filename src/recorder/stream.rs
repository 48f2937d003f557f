//! Tee stream used to capture the profiled program's stdout/stderr.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Output sink shared between the host runtime and the session
pub type SharedSink = Rc<RefCell<dyn Write>>;

/// Forwards every write to the original sink and keeps a copy
pub struct RecordingStream {
    real: SharedSink,
    content: Rc<RefCell<Vec<u8>>>,
}

impl RecordingStream {
    pub fn new(real: SharedSink) -> Self {
        Self {
            real,
            content: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle on the captured bytes, still readable after the stream is dropped
    pub fn content(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.content)
    }
}

impl Write for RecordingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.real.borrow_mut().write(buf)?;
        self.content.borrow_mut().extend_from_slice(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.real.borrow_mut().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tee_keeps_copy() {
        let real = Rc::new(RefCell::new(Vec::<u8>::new()));
        let sink: SharedSink = real.clone();
        let mut stream = RecordingStream::new(sink);
        let content = stream.content();

        write!(stream, "hello {}", 42).unwrap();
        stream.flush().unwrap();

        assert_eq!(&*real.borrow(), b"hello 42");
        assert_eq!(&*content.borrow(), b"hello 42");
    }
}
