use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use super::{EpisodeProvider, build_http_client, fetch_json, parse_base_url};
use crate::types::{AnimeDetails, EpisodeInfo, EpisodeStream, SubtitleTrack, VideoSource};

const SERVICE: &str = "Zoro";

pub struct ZoroClient {
    client: Client,
    base: Url,
}

impl ZoroClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base: parse_base_url(base_url)?,
        })
    }

    pub fn search_url(&self, query: &str, page: u32) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["anime", "zoro", query]);
        }
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    fn route(&self, name: &str) -> Result<Url> {
        Ok(self.base.join(&format!("anime/zoro/{name}"))?)
    }
}

impl EpisodeProvider for ZoroClient {
    async fn search(&self, query: &str, page: u32) -> Result<ZoroSearchResponse> {
        fetch_json(&self.client, SERVICE, &self.search_url(query, page)).await
    }

    async fn info(&self, id: &str) -> Result<ZoroInfo> {
        let mut url = self.route("info")?;
        url.query_pairs_mut().append_pair("id", id);
        fetch_json(&self.client, SERVICE, &url).await
    }

    async fn watch(&self, episode_id: &str, server: &str) -> Result<ZoroWatch> {
        let mut url = self.route("watch")?;
        url.query_pairs_mut()
            .append_pair("episodeId", episode_id)
            .append_pair("server", server);
        fetch_json(&self.client, SERVICE, &url).await
    }
}

// --- Payload ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoroSearchResponse {
    #[serde(default, rename = "totalPages")]
    pub total_pages: u32,
    #[serde(default)]
    pub results: Vec<ZoroSearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoroSearchItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ZoroTitle {
    Plain(String),
    Localized {
        #[serde(default)]
        romaji: Option<String>,
        #[serde(default)]
        english: Option<String>,
    },
}

impl ZoroTitle {
    pub fn display(&self) -> Option<&str> {
        let title = match self {
            ZoroTitle::Plain(title) => Some(title.as_str()),
            ZoroTitle::Localized { romaji, english } => romaji.as_deref().or(english.as_deref()),
        };
        title.filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoroInfo {
    #[serde(default)]
    pub title: Option<ZoroTitle>,
    #[serde(default, rename = "averageScore")]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub episodes: Option<Vec<ZoroEpisode>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoroEpisode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub number: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoroWatch {
    #[serde(default)]
    pub sources: Vec<ZoroSource>,
    #[serde(default)]
    pub subtitles: Vec<ZoroSubtitle>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoroSource {
    pub url: String,
    #[serde(default, rename = "isM3U8")]
    pub is_m3u8: bool,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoroSubtitle {
    pub url: String,
    #[serde(default)]
    pub lang: String,
}

fn episode_number_label(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => String::from("N/A"),
    }
}

/// Maps an info payload to the detail view-model. Payloads without a title
/// or an episode list are rejected so callers can fall back to a placeholder.
pub fn anime_details(info: &ZoroInfo) -> Option<AnimeDetails> {
    let title = info.title.as_ref()?.display()?.to_string();
    let episodes = info.episodes.as_ref()?;
    Some(AnimeDetails {
        title,
        rating: info
            .average_score
            .map(|score| format!("{:.1}", score / 10.0))
            .unwrap_or_else(|| String::from("N/A")),
        synopsis: info
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| String::from("No description available")),
        image: info.image.clone().unwrap_or_default(),
        episodes: episodes
            .iter()
            .map(|ep| EpisodeInfo {
                id: ep.id.clone().unwrap_or_default(),
                number: episode_number_label(ep.number.as_ref()),
                title: ep
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| String::from("Untitled")),
            })
            .collect(),
    })
}

/// `None` when the upstream returned no playable source at all.
pub fn episode_stream(watch: ZoroWatch) -> Option<EpisodeStream> {
    if watch.sources.is_empty() {
        return None;
    }
    Some(EpisodeStream {
        sources: watch
            .sources
            .into_iter()
            .map(|s| VideoSource {
                url: s.url,
                is_m3u8: s.is_m3u8,
                quality: s.quality,
            })
            .collect(),
        subtitles: watch
            .subtitles
            .into_iter()
            .filter(|s| !s.url.is_empty())
            .map(|s| SubtitleTrack {
                url: s.url,
                lang: s.lang,
            })
            .collect(),
        headers: watch.headers,
    })
}
