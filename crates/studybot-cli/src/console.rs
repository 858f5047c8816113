//! Terminal rendering of a streamed reply

use std::io::Write;
use studybot_core::{StreamError, StreamHandler};
use tracing::warn;

/// Writes each reply fragment as it arrives and remembers the outcome
pub struct ConsoleHandler<W: Write + Send> {
    out: W,
    done: bool,
    error: Option<StreamError>,
}

impl<W: Write + Send> ConsoleHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            done: false,
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_result(self) -> Result<W, StreamError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.out),
        }
    }
}

impl<W: Write + Send> StreamHandler for ConsoleHandler<W> {
    fn on_chunk(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write reply chunk: {}", e);
        }
    }

    fn on_done(&mut self) {
        self.done = true;
        if let Err(e) = writeln!(self.out).and_then(|_| self.out.flush()) {
            warn!("Failed to finish reply output: {}", e);
        }
    }

    fn on_error(&mut self, error: StreamError) {
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_written_in_order() {
        let mut handler = ConsoleHandler::new(Vec::new());
        handler.on_chunk("Hi");
        handler.on_chunk(" there");
        handler.on_done();

        assert!(handler.is_done());
        let out = handler.into_result().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hi there\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_write_failures_do_not_change_outcome() {
        let mut handler = ConsoleHandler::new(BrokenPipe);
        handler.on_chunk("lost");
        handler.on_done();

        assert!(handler.is_done());
        assert!(handler.into_result().is_ok());
    }

    #[test]
    fn test_error_is_returned() {
        let mut handler = ConsoleHandler::new(Vec::new());
        handler.on_chunk("partial");
        handler.on_error(StreamError::Unauthorized);

        assert!(!handler.is_done());
        assert!(matches!(
            handler.into_result(),
            Err(StreamError::Unauthorized)
        ));
    }
}
