//! Incremental UTF-8 decoding across chunk boundaries

/// Malformed bytes in a streamed response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid UTF-8 sequence at byte {offset} of the response")]
    Invalid { offset: usize },

    #[error("response ended inside a multi-byte character ({pending} bytes pending)")]
    Truncated { pending: usize },
}

/// Stateful decoder that holds back an incomplete trailing character until
/// the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    consumed: usize,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any held-back bytes) as forms whole
    /// characters. May return an empty string.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(chunk);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(DecodeError::Invalid {
                    offset: self.consumed + e.valid_up_to(),
                });
            }
        };

        let tail = self.pending.split_off(valid_up_to);
        let complete = std::mem::replace(&mut self.pending, tail);
        self.consumed += complete.len();

        String::from_utf8(complete).map_err(|e| DecodeError::Invalid {
            offset: self.consumed + e.utf8_error().valid_up_to(),
        })
    }

    /// Bytes held back waiting for the rest of a character
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Called at end of stream; fails if a character was left unfinished
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated {
                pending: self.pending.len(),
            })
        }
    }
}
