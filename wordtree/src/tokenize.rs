//! Word splitting for ingestion.
//!
//! A word is a maximal run of ASCII letters and digits, lower-cased. Every
//! other byte separates words.

/// Iterator over the words of a text and the byte offset each starts at.
#[derive(Debug, Clone)]
pub struct Words<'a> {
    text: &'a [u8],
    position: usize,
}

/// Split `text` into lower-cased words.
#[must_use]
pub const fn words(text: &[u8]) -> Words<'_> {
    Words { text, position: 0 }
}

impl Iterator for Words<'_> {
    type Item = (Vec<u8>, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.text.get(self.position..)?;
        let start = self.position + rest.iter().position(u8::is_ascii_alphanumeric)?;
        let len = self.text[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        self.position = start + len;

        let word = self.text[start..start + len].to_ascii_lowercase();
        Some((word, start as u64))
    }
}
