use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

pub mod gojo;
pub mod jikan;
pub mod zoro;

use jikan::JikanAnime;
use zoro::{ZoroInfo, ZoroSearchResponse, ZoroWatch};

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// MyAnimeList-backed catalog metadata.
pub trait MetadataProvider {
    async fn top_anime(&self) -> Result<Vec<JikanAnime>>;
    async fn season_now(&self, sort_by_start_date: bool) -> Result<Vec<JikanAnime>>;
    /// Best match for a title, if any.
    async fn search_first(&self, title: &str) -> Result<Option<JikanAnime>>;
}

/// Episode lists and playable sources.
pub trait EpisodeProvider {
    async fn search(&self, query: &str, page: u32) -> Result<ZoroSearchResponse>;
    async fn info(&self, id: &str) -> Result<ZoroInfo>;
    async fn watch(&self, episode_id: &str, server: &str) -> Result<ZoroWatch>;
}

pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to create HTTP client")
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).with_context(|| format!("invalid base URL {raw}"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub async fn fetch_text(client: &Client, service: &str, url: &Url) -> Result<String> {
    debug!(service, %url, "GET");
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(ApiError::from)
        .with_context(|| format!("request to {service} failed"))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(ApiError::from)
        .with_context(|| format!("failed to read {service} response"))?;
    if !status.is_success() {
        return Err(ApiError::from_status(service, status, &text).into());
    }
    Ok(text)
}

pub async fn fetch_json<T: DeserializeOwned>(client: &Client, service: &str, url: &Url) -> Result<T> {
    let text = fetch_text(client, service, url).await?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {service} response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("https://api.consumet.org").unwrap();
        assert_eq!(url.as_str(), "https://api.consumet.org/");
        let url = parse_base_url("http://localhost:3000/v1").unwrap();
        assert_eq!(url.join("anime").unwrap().as_str(), "http://localhost:3000/v1/anime");
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        assert!(parse_base_url("not a url").is_err());
    }
}
