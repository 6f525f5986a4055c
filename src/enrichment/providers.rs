//! External metadata lookups keyed by programme title

use crate::errors::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const TMDB_API_URL: &str = "https://api.themoviedb.org/3";
pub const TMDB_POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";
pub const GOOGLE_IMAGE_SEARCH_URL: &str = "https://www.google.com/search";

const IMAGE_SEARCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// First search result of a movie lookup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MovieDetails {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
}

/// `None` for missing, empty or whitespace-only text
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl MovieDetails {
    pub fn title_text(&self) -> Option<String> {
        non_blank(self.title.as_deref())
    }

    pub fn overview_text(&self) -> Option<String> {
        non_blank(self.overview.as_deref())
    }

    pub fn poster_url(&self) -> Option<String> {
        non_blank(self.poster_path.as_deref()).map(|p| format!("{TMDB_POSTER_BASE_URL}{p}"))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MovieSearch: Send + Sync {
    /// Best match for `title`, or `None` when nothing was found
    async fn search_movie(&self, title: &str) -> ProviderResult<Option<MovieDetails>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// One image URL for `title`, or `None` when nothing was found
    async fn search_image(&self, title: &str) -> ProviderResult<Option<String>>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MovieDetails>,
}

/// The Movie Database search API
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: String, timeout: Duration) -> ProviderResult<Self> {
        Self::with_base_url(api_key, timeout, TMDB_API_URL.to_string())
    }

    pub fn with_base_url(
        api_key: String,
        timeout: Duration,
        base_url: String,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::request("tmdb", e))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MovieSearch for TmdbClient {
    async fn search_movie(&self, title: &str) -> ProviderResult<Option<MovieDetails>> {
        let response = self
            .client
            .get(format!("{}/search/movie", self.base_url))
            .query(&[("api_key", self.api_key.as_str()), ("query", title)])
            .send()
            .await
            .map_err(|e| ProviderError::request("tmdb", e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: "tmdb".to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| ProviderError::Decode {
            provider: "tmdb".to_string(),
            message: e.to_string(),
        })?;

        debug!("TMDB returned {} results for '{}'", body.results.len(), title);
        Ok(body.results.into_iter().next())
    }
}

/// Google image search scraped for a representative image
pub struct GoogleImageSearch {
    client: Client,
    search_url: String,
}

impl GoogleImageSearch {
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        Self::with_search_url(timeout, GOOGLE_IMAGE_SEARCH_URL.to_string())
    }

    pub fn with_search_url(timeout: Duration, search_url: String) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(IMAGE_SEARCH_USER_AGENT)
            .build()
            .map_err(|e| ProviderError::request("image search", e))?;
        Ok(Self { client, search_url })
    }
}

/// The second `<img>` of a results page. The first is the site logo.
fn second_image_src(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("img").ok()?;
    document
        .select(&selector)
        .nth(1)
        .and_then(|img| non_blank(img.value().attr("src")))
}

#[async_trait]
impl ImageSearch for GoogleImageSearch {
    async fn search_image(&self, title: &str) -> ProviderResult<Option<String>> {
        let query = format!("\"{title}\" television show");
        let url = format!(
            "{}?tbm=isch&safe=active&tbs=isz:m&q={}",
            self.search_url,
            urlencoding::encode(&query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::request("image search", e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: "image search".to_string(),
                status: response.status().as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::request("image search", e))?;
        Ok(second_image_src(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_tmdb_takes_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("api_key", "key"))
            .and(query_param("query", "Alien"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Alien", "overview": "In space...", "poster_path": "/alien.jpg"},
                    {"title": "Aliens", "overview": "Again", "poster_path": null}
                ]
            })))
            .mount(&server)
            .await;

        let tmdb =
            TmdbClient::with_base_url("key".to_string(), Duration::from_secs(5), server.uri())
                .unwrap();
        let details = tmdb.search_movie("Alien").await.unwrap().unwrap();
        assert_eq!(details.overview.as_deref(), Some("In space..."));
        assert_eq!(
            details.poster_url().as_deref(),
            Some("https://image.tmdb.org/t/p/w500/alien.jpg")
        );
    }

    #[tokio::test]
    async fn test_tmdb_no_results_and_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/search/movie"))
            .and(query_param("query", "Nothing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;
        Mock::given(path("/search/movie"))
            .and(query_param("query", "Broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmdb =
            TmdbClient::with_base_url("key".to_string(), Duration::from_secs(5), server.uri())
                .unwrap();
        assert!(tmdb.search_movie("Nothing").await.unwrap().is_none());
        assert!(matches!(
            tmdb.search_movie("Broken").await,
            Err(ProviderError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn test_second_image_is_used() {
        let html = r#"<html><body><img src="/logo.png"><div><img src="https://img/show.jpg"></div></body></html>"#;
        assert_eq!(second_image_src(html).as_deref(), Some("https://img/show.jpg"));
        assert_eq!(second_image_src(r#"<img src="/logo.png">"#), None);
        assert_eq!(second_image_src(r#"<img src="/logo.png"><img src="  ">"#), None);
    }

    #[test]
    fn test_blank_movie_fields_read_as_missing() {
        let details: MovieDetails = serde_json::from_value(serde_json::json!({
            "title": " ",
            "overview": "",
            "poster_path": ""
        }))
        .unwrap();
        assert_eq!(details.title_text(), None);
        assert_eq!(details.overview_text(), None);
        assert_eq!(details.poster_url(), None);
    }

    #[tokio::test]
    async fn test_image_search_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("tbm", "isch"))
            .and(query_param("q", "\"Top Gear\" television show"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<img src="logo"><img src="https://img/topgear.jpg">"#,
            ))
            .mount(&server)
            .await;

        let search =
            GoogleImageSearch::with_search_url(Duration::from_secs(5), server.uri()).unwrap();
        assert_eq!(
            search.search_image("Top Gear").await.unwrap().as_deref(),
            Some("https://img/topgear.jpg")
        );
    }
}
