//! Article feed from the headless content API.
//!
//! One attempt per fetch, bounded by the configured timeout. Any network
//! error, timeout, non-2xx status or undecodable body falls back to the
//! bundled dataset; only a broken fallback surfaces as
//! [`ArticleFeed::Unavailable`].

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{Article, ArticleEnvelope};
use std::time::Duration;
use tracing::{error, info, warn};

pub const ARTICLES_PATH: &str = "/items/spravochnik";
pub const HEALTH_ANALYSIS_CATEGORY: &str = "Анализ состояния здоровья";

const BUNDLED_ARTICLES: &str = include_str!("../data/articles.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArticleFeed {
    Loaded {
        articles: Vec<Article>,
        source: FeedSource,
    },
    Unavailable {
        message: String,
    },
}

impl ArticleFeed {
    pub fn articles(&self) -> &[Article] {
        match self {
            ArticleFeed::Loaded { articles, .. } => articles,
            ArticleFeed::Unavailable { .. } => &[],
        }
    }

    pub fn source(&self) -> Option<FeedSource> {
        match self {
            ArticleFeed::Loaded { source, .. } => Some(*source),
            ArticleFeed::Unavailable { .. } => None,
        }
    }

    pub fn find(&self, id: i64) -> Option<&Article> {
        self.articles().iter().find(|a| a.id == id)
    }

    /// Articles of one category, in feed order.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Article> {
        self.articles()
            .iter()
            .filter(move |a| a.category.as_deref() == Some(category))
    }
}

pub struct ArticleClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    fallback: String,
}

impl ArticleClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}{ARTICLES_PATH}", config.content_api_url),
            timeout: config.fetch_timeout,
            fallback: BUNDLED_ARTICLES.to_string(),
        }
    }

    /// Replaces the bundled fallback dataset.
    pub fn with_fallback(mut self, raw: impl Into<String>) -> Self {
        self.fallback = raw.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch_remote(&self) -> Result<Vec<Article>, AppError> {
        let request = async {
            let response = self.http.get(&self.url).send().await?.error_for_status()?;
            let envelope: ArticleEnvelope = response.json().await?;
            Ok::<_, AppError>(envelope.data)
        };
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(elapsed) => Err(AppError::remote(elapsed)),
        }
    }

    pub fn fallback_articles(&self) -> Result<Vec<Article>, AppError> {
        let envelope: ArticleEnvelope = serde_json::from_str(&self.fallback)?;
        Ok(envelope.data)
    }

    pub async fn articles(&self) -> ArticleFeed {
        match self.fetch_remote().await {
            Ok(articles) => {
                info!(count = articles.len(), "articles fetched");
                return ArticleFeed::Loaded {
                    articles,
                    source: FeedSource::Remote,
                };
            }
            Err(err) => warn!(url = %self.url, "article fetch failed, using fallback: {err}"),
        }

        match self.fallback_articles() {
            Ok(articles) => ArticleFeed::Loaded {
                articles,
                source: FeedSource::Fallback,
            },
            Err(err) => {
                error!("fallback articles unavailable: {err}");
                ArticleFeed::Unavailable {
                    message: "Articles could not be loaded".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_fallback_parses() {
        let client = ArticleClient::new(&AppConfig::default());
        let articles = client.fallback_articles().unwrap();
        assert!(!articles.is_empty());
        assert!(articles.iter().all(|a| !a.title.is_empty()));
    }

    #[test]
    fn url_joins_base_and_collection() {
        let config = AppConfig::default().with_content_api_url("http://localhost:8055/");
        let client = ArticleClient::new(&config);
        assert_eq!(client.url(), "http://localhost:8055/items/spravochnik");
    }

    #[test]
    fn feed_filters_by_category() {
        let client = ArticleClient::new(&AppConfig::default());
        let feed = ArticleFeed::Loaded {
            articles: client.fallback_articles().unwrap(),
            source: FeedSource::Fallback,
        };
        assert_eq!(feed.in_category(HEALTH_ANALYSIS_CATEGORY).count(), 2);
        assert_eq!(feed.find(3).and_then(Article::published), Some("2025-03-10"));
        assert!(feed.find(99).is_none());
    }
}
