pub mod datetime;
pub mod sentiment;
pub mod top_stories;
pub mod word_count;

pub use datetime::CurrentDateTime;
pub use sentiment::{analyze_sentiment, Sentiment, SentimentReport};
pub use top_stories::TopStories;
pub use word_count::{count_words, WordCount};
