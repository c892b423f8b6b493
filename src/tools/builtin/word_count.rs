use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::handler::{text_argument, ToolHandler};
use crate::tools::result::ToolError;
use crate::types::ToolDeclaration;

pub const NAME: &str = "count_words";

/// The ECMAScript `\s` class. Differs from `char::is_whitespace` on
/// U+0085 (not whitespace here) and U+FEFF (whitespace here).
pub(crate) fn is_separator(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\u{0B}'
            | '\u{0C}'
            | '\r'
            | ' '
            | '\u{A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Non-empty runs of text between separators.
pub(crate) fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_separator).filter(|w| !w.is_empty())
}

/// Whitespace-separated token count.
///
/// Blank input counts as one word: splitting an empty string yields a single
/// empty token. Callers depend on this, so it is kept.
pub fn count_words(text: &str) -> usize {
    let trimmed = text.trim_matches(is_separator);
    if trimmed.is_empty() {
        return 1;
    }
    words(trimmed).count()
}

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        NAME,
        "When asked about word count, number of words, or how many words, use this tool. \
         It counts the total number of words in a text by splitting on whitespace.",
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to count words from. Can be any length of text, \
                                    from a single word to multiple paragraphs."
                }
            },
            "required": ["text"]
        }),
    )
}

pub struct WordCount;

#[async_trait]
impl ToolHandler for WordCount {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        Ok(Value::from(count_words(text_argument(arguments, "text")?)))
    }
}
