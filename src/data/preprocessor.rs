// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Cleans raw review / post text before tokenisation.
//
// Scraped sentiment corpora are noisy:
//   - emoji, emoticons and decorative symbols
//   - full-width and half-width punctuation mixed together
//   - URLs, @-mentions and hashtags glued to words
//   - runs of whitespace and line breaks
//
// Cleaning rule: keep every Unicode letter or digit (CJK
// ideographs count as letters), turn everything else into a
// space, then collapse whitespace runs and trim.
//
// A row whose cleaned text is empty carries no signal and is
// dropped by the caller.
//
// Reference: Rust Book §8 (Strings in Rust)

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text string for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: Letters and digits survive, everything else is a gap ─────
        let mapped = text
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' });

        // ── Step 2: Collapse whitespace runs into a single space ─────────────
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;
        for c in mapped {
            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        // A trailing gap may remain from the last symbol.
        out.trim_end().to_string()
    }

    /// Clean text and report whether anything usable is left.
    pub fn clean_nonempty(&self, text: &str) -> Option<String> {
        let cleaned = self.clean(text);
        if cleaned.is_empty() { None } else { Some(cleaned) }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_punctuation_and_symbols() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("great room!!! :-) 10/10"), "great room 10 10");
    }

    #[test]
    fn test_keeps_cjk_text() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("房间很干净，服务也好！"), "房间很干净 服务也好");
    }

    #[test]
    fn test_collapses_whitespace_and_newlines() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  hello \n\n\t world  "), "hello world");
    }

    #[test]
    fn test_symbol_only_text_is_empty() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("!!! ??? ..."), "");
        assert!(p.clean_nonempty("🙂🙂").is_none());
    }
}
