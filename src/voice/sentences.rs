//! Streaming sentence chunker
//!
//! Model replies arrive as arbitrary fragments. Speaking each fragment as-is
//! would cut words in half, so fragments are buffered and released one
//! complete sentence at a time.

/// Characters that end a sentence when followed by whitespace
const TERMINATORS: &[char] = &['.', '!', '?', '…', ';', ':'];

/// Markup the model sometimes emits that should not be read aloud
const MARKUP: &[char] = &['*', '#', '`'];

/// Buffers fragments and yields speakable sentences
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment, returning every sentence it completes
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut sentences = Vec::new();
        while let Some(end) = self.sentence_end() {
            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            if let Some(clean) = speakable(&sentence) {
                sentences.push(clean);
            }
        }

        sentences
    }

    /// Release whatever is left once the reply is complete
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        speakable(&rest)
    }

    /// Byte offset just past the first complete sentence, if any
    fn sentence_end(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\n' {
                return Some(i + c.len_utf8());
            }
            if TERMINATORS.contains(&c) {
                // Swallow runs like "?!" or "..."
                while let Some(&(_, next)) = chars.peek() {
                    if TERMINATORS.contains(&next) {
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(&(j, next)) = chars.peek()
                    && next.is_whitespace()
                {
                    return Some(j);
                }
            }
        }
        None
    }
}

/// Strip markup and whitespace; `None` if nothing speakable remains
fn speakable(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| !MARKUP.contains(c)).collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}
