use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One tile in a catalog row (best, popular, recently aired).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    pub image: String,
    pub year: Option<u32>,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aired: Option<String>,
}

impl CatalogEntry {
    pub fn label(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({}) \u{00b7} {}", self.title, year, self.duration),
            None => format!("{} \u{00b7} {}", self.title, self.duration),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedEntry {
    pub id: u64,
    pub title: String,
    pub large_image_url: Option<String>,
    pub image_url: Option<String>,
    pub synopsis: String,
    pub trailer_embed_url: String,
    pub trailer_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeInfo {
    pub id: String,
    pub number: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeDetails {
    pub title: String,
    pub rating: String,
    pub synopsis: String,
    pub image: String,
    pub episodes: Vec<EpisodeInfo>,
}

impl AnimeDetails {
    pub fn placeholder() -> Self {
        Self {
            title: String::from("Unknown"),
            rating: String::from("N/A"),
            synopsis: String::from("No description available"),
            image: String::new(),
            episodes: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.title == "Unknown" && self.episodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JikanDetails {
    pub banner_image: Option<String>,
    pub genres: Vec<String>,
    pub rating: String,
    pub synopsis: String,
}

/// What the detail view shows once Zoro and Jikan data are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailPage {
    pub id: String,
    pub title: String,
    pub banner: Option<String>,
    pub rating: String,
    pub synopsis: String,
    pub genres: Vec<String>,
    pub episodes: Vec<EpisodeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    TvSeries,
    Movie,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::TvSeries => "TV Series",
            MediaKind::Movie => "Movie",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub image: Option<String>,
    pub year: Option<String>,
    pub kind: MediaKind,
    pub duration: String,
}

impl SearchResult {
    pub fn label(&self) -> String {
        match &self.year {
            Some(year) => format!("{} [{} \u{2022} {}]", self.title, self.kind.label(), year),
            None => format!("{} [{}]", self.title, self.kind.label()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub url: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub url: String,
    pub is_m3u8: bool,
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeStream {
    pub sources: Vec<VideoSource>,
    pub subtitles: Vec<SubtitleTrack>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedAnime {
    pub title: String,
    pub image: Option<String>,
    pub link: Option<String>,
    pub episode_count: String,
}
