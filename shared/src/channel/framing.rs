use crate::constants::{FRAME_DELIMITER, MAX_FRAME_LEN};
use log::warn;

/// Accumulates raw reads and yields complete newline-terminated messages.
///
/// Works for both channel flavors: a message-mode read that carries exactly one frame, and a
/// byte-stream read that splits or merges frames. `\r` before the delimiter is dropped, empty
/// lines are skipped and invalid UTF-8 is replaced rather than rejected. A frame that outgrows
/// `MAX_FRAME_LEN` is dropped whole, up to and including its delimiter.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    /// Inside an oversized frame; input is ignored until the next delimiter.
    discarding: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<String> {
        if self.discarding {
            match bytes.iter().position(|b| *b == FRAME_DELIMITER) {
                Some(pos) => {
                    bytes = &bytes[pos + 1..];
                    self.discarding = false;
                }
                None => return Vec::new(),
            }
        }
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.pending[consumed..].iter().position(|b| *b == FRAME_DELIMITER) {
            let end = consumed + pos;
            let raw = &self.pending[consumed..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if !raw.is_empty() {
                lines.push(String::from_utf8_lossy(raw).into_owned());
            }
            consumed = end + 1;
        }
        self.pending.drain(..consumed);

        if self.pending.len() > MAX_FRAME_LEN {
            warn!("dropping {} bytes of unterminated frame", self.pending.len());
            self.pending.clear();
            self.discarding = true;
        }
        lines
    }

    /// Bytes still waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_frames_in_one_read() {
        let mut d = LineDecoder::new();
        assert_eq!(d.push(b"a\nbb\r\nccc\n"), vec!["a", "bb", "ccc"]);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn joins_frames_across_reads() {
        let mut d = LineDecoder::new();
        assert!(d.push(b"{\"type\":\"game").is_empty());
        assert_eq!(d.pending_len(), 13);
        assert_eq!(d.push(b"State\"}\nnext"), vec![r#"{"type":"gameState"}"#]);
        assert_eq!(d.push(b"\n"), vec!["next"]);
    }

    #[test]
    fn skips_empty_lines_and_replaces_bad_utf8() {
        let mut d = LineDecoder::new();
        assert_eq!(d.push(b"\n\r\nok\xff\n"), vec!["ok\u{fffd}"]);
    }

    #[test]
    fn oversized_partial_frame_is_dropped() {
        let mut d = LineDecoder::new();
        let junk = vec![b'x'; MAX_FRAME_LEN + 1];
        assert!(d.push(&junk).is_empty());
        assert_eq!(d.pending_len(), 0);
        assert_eq!(d.push(b"fine\n"), Vec::<String>::new());
        assert_eq!(d.push(b"next\n"), vec!["next"]);
    }

    #[test]
    fn oversized_frame_tail_is_not_delivered() {
        let mut d = LineDecoder::new();
        assert!(d.push(&vec![b'x'; MAX_FRAME_LEN + 1]).is_empty());
        assert!(d.push(b"more of the same frame").is_empty());
        assert_eq!(d.pending_len(), 0);
        assert_eq!(d.push(b"xx\r\n{\"type\":\"event\"}\n"), vec![r#"{"type":"event"}"#]);
    }

    #[test]
    fn reset_ends_discarding() {
        let mut d = LineDecoder::new();
        d.push(&vec![b'x'; MAX_FRAME_LEN + 1]);
        d.reset();
        assert_eq!(d.push(b"fresh\n"), vec!["fresh"]);
    }
}
