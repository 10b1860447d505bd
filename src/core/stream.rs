use crate::domain::model::StreamUsage;

/// In-band marker separating streamed narrative text from the trailing
/// usage payload. The producer emits it preceded by a newline.
pub const USAGE_SENTINEL: &str = "[[[TOKEN_USAGE]]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Narrative,
    Usage,
}

/// Incremental demultiplexer for an interpretation stream.
///
/// Two modes: narrative text is emitted through the callback as it arrives;
/// once the sentinel is seen, everything after it accumulates into the usage
/// buffer and is parsed as JSON at end of stream. The sentinel may be split
/// at any byte offset across chunks, so in narrative mode the last
/// `sentinel length` characters are always held back until more input (or
/// the end of the stream) rules out a framing newline followed by a partial
/// sentinel.
///
/// State is scoped to a single stream; create a fresh demux per response.
#[derive(Debug, Default)]
pub struct StreamDemux {
    mode: Mode,
    pending: String,
    usage_buf: String,
    partial_utf8: Vec<u8>,
}

impl StreamDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk from the wire. Multi-byte characters split across
    /// chunk boundaries are carried until completed.
    pub fn push_bytes(&mut self, bytes: &[u8], emit: &mut dyn FnMut(&str)) {
        let decoded = self.take_decoded(bytes);
        if !decoded.is_empty() {
            self.push(&decoded, emit);
        }
    }

    /// Feeds one text chunk.
    pub fn push(&mut self, chunk: &str, emit: &mut dyn FnMut(&str)) {
        match self.mode {
            Mode::Usage => self.usage_buf.push_str(chunk),
            Mode::Narrative => {
                self.pending.push_str(chunk);

                if let Some(idx) = self.pending.find(USAGE_SENTINEL) {
                    let mut narrative = &self.pending[..idx];
                    // The producer writes "\n" + sentinel; that newline is
                    // framing, not narrative.
                    if let Some(stripped) = narrative.strip_suffix('\n') {
                        narrative = stripped;
                    }
                    if !narrative.is_empty() {
                        emit(narrative);
                    }
                    self.usage_buf = self.pending[idx + USAGE_SENTINEL.len()..].to_string();
                    self.pending.clear();
                    self.mode = Mode::Usage;
                } else {
                    // Hold back the framing newline plus a maximal partial
                    // sentinel so neither can leak into the narrative.
                    let hold = USAGE_SENTINEL.len();
                    if let Some((split, _)) = self.pending.char_indices().rev().nth(hold - 1) {
                        if split > 0 {
                            emit(&self.pending[..split]);
                            self.pending.drain(..split);
                        }
                    }
                }
            }
        }
    }

    /// Signals end of stream. Any held narrative is flushed; in usage mode
    /// the accumulated payload is parsed, with a malformed payload yielding
    /// no usage record rather than an error.
    pub fn finish(mut self, emit: &mut dyn FnMut(&str)) -> Option<StreamUsage> {
        if !self.partial_utf8.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut self.partial_utf8)).into_owned();
            self.push(&tail, emit);
        }

        match self.mode {
            Mode::Narrative => {
                if !self.pending.is_empty() {
                    emit(&self.pending);
                }
                None
            }
            Mode::Usage => match serde_json::from_str(self.usage_buf.trim()) {
                Ok(usage) => Some(usage),
                Err(e) => {
                    tracing::debug!("unparseable usage payload dropped: {e}");
                    None
                }
            },
        }
    }

    fn take_decoded(&mut self, bytes: &[u8]) -> String {
        self.partial_utf8.extend_from_slice(bytes);
        let buf = std::mem::take(&mut self.partial_utf8);
        match String::from_utf8(buf) {
            Ok(s) => s,
            Err(e) => {
                let valid_up_to = e.utf8_error().valid_up_to();
                let incomplete_tail = e.utf8_error().error_len().is_none();
                let bytes = e.into_bytes();
                if incomplete_tail {
                    self.partial_utf8 = bytes[valid_up_to..].to_vec();
                    String::from_utf8_lossy(&bytes[..valid_up_to]).into_owned()
                } else {
                    String::from_utf8_lossy(&bytes).into_owned()
                }
            }
        }
    }
}
