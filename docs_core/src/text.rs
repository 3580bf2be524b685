//! Sentence and word model for documents.
//!
//! A sentence ends at `.`, `!` or `?` (the delimiter stays with it) and the
//! whitespace between sentences belongs to none of them. Trailing text
//! without a delimiter still forms a sentence. [`Document`] joins sentences
//! with a single space; [`splice_sentence`] rewrites one sentence in place
//! and leaves the rest of the text as it was.

use std::fmt;
use std::ops::Range;

const DELIMITERS: [char; 3] = ['.', '!', '?'];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EditError {
    #[error("sentence {index} out of range ({count} sentences)")]
    SentenceOutOfRange { index: usize, count: usize },
    #[error("word {index} out of range ({count} words)")]
    WordOutOfRange { index: usize, count: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    sentences: Vec<String>,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        let sentences = sentence_spans(content)
            .into_iter()
            .map(|span| content[span].to_string())
            .collect();
        Self { sentences }
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn sentence(&self, index: usize) -> Option<&str> {
        self.sentences.get(index).map(String::as_str)
    }

    /// `index == sentence_count()` addresses the empty sentence that
    /// follows the last one.
    pub fn check_sentence(&self, index: usize) -> Result<(), EditError> {
        if index > self.sentences.len() {
            return Err(EditError::SentenceOutOfRange {
                index,
                count: self.sentences.len(),
            });
        }
        Ok(())
    }

    /// Replaces word `word_index` of sentence `sentence_index` with `word`,
    /// or appends it when `word_index` equals the sentence's word count.
    pub fn edit_word(
        &mut self,
        sentence_index: usize,
        word_index: usize,
        word: &str,
    ) -> Result<(), EditError> {
        self.check_sentence(sentence_index)?;
        let current = self.sentence(sentence_index).unwrap_or("");
        let edited = edit_sentence(current, word_index, word)?;
        self.set_sentence(sentence_index, edited);
        Ok(())
    }

    /// Stores `text` as sentence `index`, appending when the index is past
    /// the end.
    pub fn set_sentence(&mut self, index: usize, text: String) {
        match self.sentences.get_mut(index) {
            Some(slot) => *slot = text,
            None => self.sentences.push(text),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sentences.join(" "))
    }
}

/// Byte ranges of the sentences in `content`, in order.
pub fn sentence_spans(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in content.char_indices() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }
        if DELIMITERS.contains(&c)
            && let Some(s) = start.take()
        {
            spans.push(s..i + c.len_utf8());
        }
    }
    if let Some(s) = start {
        spans.push(s..s + content[s..].trim_end().len());
    }
    spans
}

/// Replaces sentence `index` of `content` with `sentence`. An index at or
/// past the end adds the sentence after the last one. Everything outside
/// the replaced sentence is kept byte for byte.
pub fn splice_sentence(content: &str, index: usize, sentence: &str) -> String {
    let spans = sentence_spans(content);
    let (at, end, sep) = match spans.get(index) {
        Some(span) => (span.start, span.end, ""),
        None => match spans.last() {
            Some(last) => (last.end, last.end, " "),
            None => (0, 0, ""),
        },
    };
    let mut out = String::with_capacity(content.len() + sentence.len() + 1);
    out.push_str(&content[..at]);
    out.push_str(sep);
    out.push_str(sentence);
    out.push_str(&content[end..]);
    out
}

pub fn edit_sentence(sentence: &str, word_index: usize, word: &str) -> Result<String, EditError> {
    let mut words: Vec<&str> = sentence.split_whitespace().collect();
    match word_index.cmp(&words.len()) {
        std::cmp::Ordering::Less => words[word_index] = word,
        std::cmp::Ordering::Equal => words.push(word),
        std::cmp::Ordering::Greater => {
            return Err(EditError::WordOutOfRange {
                index: word_index,
                count: words.len(),
            });
        }
    }
    Ok(words.join(" "))
}

pub fn words(content: &str) -> impl Iterator<Item = &str> {
    content.split_whitespace()
}

pub fn word_count(content: &str) -> usize {
    words(content).count()
}

pub fn char_count(content: &str) -> usize {
    content.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_delimiters_and_keeps_them() {
        let doc = Document::parse("Hello world.  How are you?I am fine! trailing bit");
        assert_eq!(doc.sentence_count(), 4);
        assert_eq!(doc.sentence(0), Some("Hello world."));
        assert_eq!(doc.sentence(1), Some("How are you?"));
        assert_eq!(doc.sentence(2), Some("I am fine!"));
        assert_eq!(doc.sentence(3), Some("trailing bit"));
        assert_eq!(
            doc.to_string(),
            "Hello world. How are you? I am fine! trailing bit"
        );
    }

    #[test]
    fn empty_document() {
        let doc = Document::parse("  \n");
        assert_eq!(doc.sentence_count(), 0);
        assert!(doc.check_sentence(0).is_ok());
        assert!(doc.check_sentence(1).is_err());
    }

    #[test]
    fn replace_and_append_words() {
        let mut doc = Document::parse("The cat sat.");
        doc.edit_word(0, 1, "dog").unwrap();
        assert_eq!(doc.to_string(), "The dog sat.");
        doc.edit_word(0, 3, "down.").unwrap();
        assert_eq!(doc.to_string(), "The dog sat. down.");
        assert_eq!(
            doc.edit_word(0, 9, "x"),
            Err(EditError::WordOutOfRange { index: 9, count: 4 })
        );
    }

    #[test]
    fn editing_past_last_sentence_appends_one() {
        let mut doc = Document::parse("One.");
        doc.edit_word(1, 0, "Two.").unwrap();
        assert_eq!(doc.to_string(), "One. Two.");
        assert!(matches!(
            doc.edit_word(5, 0, "x"),
            Err(EditError::SentenceOutOfRange { .. })
        ));
    }

    #[test]
    fn spans_match_parsed_sentences() {
        let content = "  Title line.\n\nSecond   para here!  tail ";
        let spans = sentence_spans(content);
        let doc = Document::parse(content);
        assert_eq!(spans.len(), doc.sentence_count());
        for (i, span) in spans.into_iter().enumerate() {
            assert_eq!(Some(&content[span]), doc.sentence(i));
        }
    }

    #[test]
    fn splice_keeps_surrounding_layout() {
        let content = "Title line.\n\nSecond   para here.\n";
        assert_eq!(
            splice_sentence(content, 0, "Heading line."),
            "Heading line.\n\nSecond   para here.\n"
        );
        assert_eq!(
            splice_sentence(content, 1, "Other."),
            "Title line.\n\nOther.\n"
        );
        assert_eq!(
            splice_sentence(content, 2, "Third."),
            "Title line.\n\nSecond   para here. Third.\n"
        );
        assert_eq!(splice_sentence("\n", 0, "First."), "First.\n");
        assert_eq!(splice_sentence("", 0, "First."), "First.");
    }

    #[test]
    fn counts() {
        assert_eq!(word_count("a b\tc\n"), 3);
        assert_eq!(char_count("héllo"), 5);
    }
}
