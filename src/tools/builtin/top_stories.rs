use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::tools::handler::ToolHandler;
use crate::tools::result::ToolError;
use crate::types::ToolDeclaration;

pub const NAME: &str = "get_hacker_news_top_stories";

const FETCH_FAILED: &str = "Failed to fetch Hacker News stories";
const STORY_COUNT: &str = "3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    pub link: String,
    pub points: u64,
    pub comments: u64,
    pub formatted_link: String,
    pub html_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopStoriesReport {
    pub stories: Vec<Story>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: Option<String>,
    url: Option<String>,
    points: Option<u64>,
    num_comments: Option<u64>,
    #[serde(rename = "objectID", default)]
    object_id: String,
}

impl From<Hit> for Story {
    fn from(hit: Hit) -> Self {
        let title = hit.title.filter(|t| !t.is_empty());
        let id = hit.object_id;
        let link = hit
            .url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={id}"));
        let label = title.as_deref().unwrap_or("Read More");

        Self {
            formatted_link: format!("[{label}]({link})"),
            html_link: format!(r#"<a href="{link}" target="_blank">{label}</a>"#),
            title: title.unwrap_or_else(|| "Untitled".into()),
            link,
            points: hit.points.unwrap_or(0),
            comments: hit.num_comments.unwrap_or(0),
        }
    }
}

/// Front-page stories from the Algolia Hacker News search API.
pub struct TopStories {
    client: reqwest::Client,
    base_url: String,
}

impl TopStories {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub async fn fetch(&self) -> Result<TopStoriesReport, ToolError> {
        let url = format!("{}/api/v1/search", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("tags", "front_page"), ("hitsPerPage", STORY_COUNT)])
            .send()
            .await
            .map_err(|e| ToolError::execution(FETCH_FAILED, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::execution(
                FETCH_FAILED,
                format!("HTTP error! status: {}", status.as_u16()),
            ));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ToolError::execution(FETCH_FAILED, e))?;
        let parsed: SearchResponse =
            serde_json::from_str(&text).map_err(|e| ToolError::execution(FETCH_FAILED, e))?;

        let stories: Vec<Story> = parsed.hits.into_iter().map(Story::from).collect();
        debug!(count = stories.len(), "fetched top stories");

        Ok(TopStoriesReport {
            stories,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        NAME,
        "When asked about top stories, tech news, or what is on Hacker News, use this tool. \
         It fetches the top 3 current front-page stories from Hacker News with their links, \
         points and comment counts.",
        json!({"type": "object", "properties": {}}),
    )
}

#[async_trait]
impl ToolHandler for TopStories {
    async fn call(&self, _arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let report = self.fetch().await?;
        serde_json::to_value(report).map_err(|e| ToolError::execution(FETCH_FAILED, e))
    }
}
