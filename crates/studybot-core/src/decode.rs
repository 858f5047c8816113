//! Incremental UTF-8 decoding for chunked response bodies

/// Decodes byte chunks into text, holding back a multi-byte character that is
/// split across chunk boundaries until the rest of it arrives.
///
/// Invalid sequences are replaced with U+FFFD rather than failing the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

                    match e.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid_len);
                        }
                        None => {
                            // Incomplete trailing sequence
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still held back at end-of-body
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    /// Number of bytes waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
