use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::tools::builtin::word_count::words;
use crate::tools::handler::{text_argument, ToolHandler};
use crate::tools::result::ToolError;
use crate::types::ToolDeclaration;

pub const NAME: &str = "analyze_sentiment";

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "awesome", "excellent", "happy", "love", "wonderful", "fantastic", "joyful",
    "delighted", "pleased",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "sad", "hate", "poor", "horrible", "miserable", "angry", "upset",
    "disappointed",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentimentReport {
    pub sentiment: String,
    pub score: i64,
    pub matches: Vec<String>,
    pub explanation: String,
}

/// Keyword-list scoring: +1 per positive word, -1 per negative word.
pub fn analyze_sentiment(text: &str) -> SentimentReport {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '!' | '?'))
        .collect();

    let mut score = 0i64;
    let mut matches = Vec::new();
    for word in words(&cleaned) {
        if POSITIVE_WORDS.contains(&word) {
            score += 1;
            matches.push(format!("'{word}' (positive)"));
        }
        if NEGATIVE_WORDS.contains(&word) {
            score -= 1;
            matches.push(format!("'{word}' (negative)"));
        }
    }

    let sentiment = match score {
        s if s > 0 => "Positive",
        s if s < 0 => "Negative",
        _ => "Neutral",
    };
    let explanation = if matches.is_empty() {
        "No clear sentiment words found".to_string()
    } else {
        format!("Found {}", matches.join(", "))
    };

    SentimentReport {
        sentiment: sentiment.into(),
        score,
        matches,
        explanation,
    }
}

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        NAME,
        "When asked to analyze sentiment, check sentiment, or determine if text is \
         positive/negative, use this tool. It analyzes the sentiment of text and returns \
         whether it has a positive, negative, or neutral emotional tone.",
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to analyze for sentiment. Can be any length of text, \
                                    from a single sentence to multiple paragraphs."
                }
            },
            "required": ["text"]
        }),
    )
}

pub struct Sentiment;

#[async_trait]
impl ToolHandler for Sentiment {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let report = analyze_sentiment(text_argument(arguments, "text")?);
        serde_json::to_value(report)
            .map_err(|e| ToolError::execution("Failed to encode sentiment", e))
    }
}
