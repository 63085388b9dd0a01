//! Incremental UTF-8 decoding across arbitrary chunk boundaries.
//!
//! Network transports hand out byte chunks with no regard for character
//! boundaries, so a multi-byte sequence can arrive split over two or more
//! reads. [`Utf8Decoder`] carries the incomplete tail of one chunk into the
//! next instead of failing or substituting replacement characters.

use std::borrow::Cow;
use std::char::REPLACEMENT_CHARACTER;

/// Stateful UTF-8 decoder.
///
/// Bytes that can never become valid UTF-8 are replaced with U+FFFD and
/// counted, the way a non-fatal text decoder behaves.
///
/// # Example
/// ```
/// use chatstream::decode::Utf8Decoder;
///
/// let mut decoder = Utf8Decoder::new();
/// let euro = "€".as_bytes();
///
/// assert_eq!(decoder.decode(&euro[..1]), "");
/// assert_eq!(decoder.decode(&euro[1..]), "€");
/// assert_eq!(decoder.finish(), "");
/// ```
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    replaced: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning every complete character it finishes.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let bytes: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // The prefix was just validated, so this never substitutes.
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));

                    match e.error_len() {
                        // Incomplete sequence at the end of input
                        None => {
                            self.pending.extend_from_slice(&rest[valid..]);
                            break;
                        }
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            self.replaced += 1;
                            rest = &rest[valid + len..];
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush the decoder at end of input.
    ///
    /// Carried bytes can no longer be completed; they become a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.replaced += 1;
        REPLACEMENT_CHARACTER.to_string()
    }

    /// Number of bytes carried over waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of replacement characters emitted so far.
    pub fn replaced(&self) -> usize {
        self.replaced
    }
}
