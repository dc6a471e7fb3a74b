use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{MetadataProvider, build_http_client, fetch_json, parse_base_url};
use crate::types::{CatalogEntry, FeaturedEntry, JikanDetails};

const SERVICE: &str = "Jikan";

pub struct JikanClient {
    client: Client,
    base: Url,
}

impl JikanClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base: parse_base_url(base_url)?,
        })
    }

    pub fn search_url(&self, title: &str) -> Result<Url> {
        let mut url = self.base.join("anime")?;
        url.query_pairs_mut()
            .append_pair("q", title)
            .append_pair("limit", "1");
        Ok(url)
    }

    async fn list(&self, url: Url) -> Result<Vec<JikanAnime>> {
        let response: JikanListResponse = fetch_json(&self.client, SERVICE, &url).await?;
        Ok(response.data)
    }
}

impl MetadataProvider for JikanClient {
    async fn top_anime(&self) -> Result<Vec<JikanAnime>> {
        self.list(self.base.join("top/anime")?).await
    }

    async fn season_now(&self, sort_by_start_date: bool) -> Result<Vec<JikanAnime>> {
        let mut url = self.base.join("seasons/now")?;
        if sort_by_start_date {
            url.query_pairs_mut().append_pair("sort", "start_date");
        }
        self.list(url).await
    }

    async fn search_first(&self, title: &str) -> Result<Option<JikanAnime>> {
        let url = self.search_url(title)?;
        Ok(self.list(url).await?.into_iter().next())
    }
}

// --- Payload ---

#[derive(Debug, Deserialize)]
struct JikanListResponse {
    #[serde(default)]
    data: Vec<JikanAnime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JikanAnime {
    pub mal_id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub images: JikanImages,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub genres: Vec<JikanNamed>,
    #[serde(default)]
    pub trailer: Option<JikanTrailer>,
    #[serde(default)]
    pub aired: Option<JikanAired>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JikanImages {
    #[serde(default)]
    pub jpg: Option<ImageSet>,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageSet {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanNamed {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JikanTrailer {
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(default)]
    pub images: Option<TrailerImages>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrailerImages {
    #[serde(default)]
    pub maximum_image_url: Option<String>,
    #[serde(default)]
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JikanAired {
    #[serde(default)]
    pub from: Option<String>,
}

impl JikanImages {
    fn jpg_small(&self) -> Option<&str> {
        non_empty(self.jpg.as_ref().and_then(|s| s.image_url.as_deref()))
    }

    fn jpg_large(&self) -> Option<&str> {
        non_empty(self.jpg.as_ref().and_then(|s| s.large_image_url.as_deref()))
    }

    fn webp_small(&self) -> Option<&str> {
        non_empty(self.webp.as_ref().and_then(|s| s.image_url.as_deref()))
    }

    fn webp_large(&self) -> Option<&str> {
        non_empty(self.webp.as_ref().and_then(|s| s.large_image_url.as_deref()))
    }

    /// Largest poster available, preferring jpg.
    pub fn best(&self) -> Option<&str> {
        self.jpg_large()
            .or_else(|| self.webp_large())
            .or_else(|| self.jpg_small())
            .or_else(|| self.webp_small())
    }
}

impl JikanAnime {
    fn display_title(&self) -> Option<&str> {
        non_empty(self.title.as_deref()).or_else(|| non_empty(self.title_english.as_deref()))
    }

    pub fn aired_from(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.aired.as_ref()?.from.as_deref()?;
        DateTime::parse_from_rfc3339(raw).ok()
    }

    fn trailer_embed_url(&self) -> Option<&str> {
        non_empty(self.trailer.as_ref().and_then(|t| t.embed_url.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn format_score(score: f64) -> String {
    format!("{score:.1}")
}

pub fn catalog_entry(anime: &JikanAnime) -> CatalogEntry {
    CatalogEntry {
        id: anime.mal_id,
        title: anime.display_title().unwrap_or("Unknown").to_string(),
        image: anime.images.jpg_small().unwrap_or_default().to_string(),
        year: anime.year,
        duration: non_empty(anime.duration.as_deref())
            .unwrap_or("N/A")
            .to_string(),
        aired: None,
    }
}

pub fn featured_entry(anime: &JikanAnime) -> Option<FeaturedEntry> {
    let embed = anime.trailer_embed_url()?;
    let trailer_images = anime.trailer.as_ref().and_then(|t| t.images.as_ref());
    Some(FeaturedEntry {
        id: anime.mal_id,
        title: anime.display_title().unwrap_or("No title").to_string(),
        large_image_url: anime
            .images
            .jpg_large()
            .or_else(|| anime.images.webp_large())
            .or_else(|| anime.images.jpg_small())
            .map(str::to_string),
        image_url: anime.images.jpg_small().map(str::to_string),
        synopsis: non_empty(anime.synopsis.as_deref())
            .unwrap_or("No description available")
            .to_string(),
        trailer_embed_url: embed.to_string(),
        trailer_image_url: trailer_images.and_then(|images| {
            non_empty(images.maximum_image_url.as_deref())
                .or_else(|| non_empty(images.large_image_url.as_deref()))
                .map(str::to_string)
        }),
    })
}

pub fn jikan_details(anime: &JikanAnime) -> JikanDetails {
    JikanDetails {
        banner_image: anime.images.best().map(str::to_string),
        genres: anime.genres.iter().map(|g| g.name.clone()).collect(),
        rating: anime
            .score
            .map(format_score)
            .unwrap_or_else(|| String::from("N/A")),
        synopsis: non_empty(anime.synopsis.as_deref())
            .unwrap_or("No description available")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_FIXTURE: &str = r#"{
      "data": [
        {
          "mal_id": 52991,
          "title": "Sousou no Frieren",
          "title_english": "Frieren: Beyond Journey's End",
          "images": {
            "jpg": {"image_url": "https://cdn.myanimelist.net/a.jpg", "large_image_url": "https://cdn.myanimelist.net/a-l.jpg"},
            "webp": {"image_url": "https://cdn.myanimelist.net/a.webp", "large_image_url": null}
          },
          "year": 2023,
          "duration": "24 min per ep",
          "score": 9.31,
          "synopsis": "An elf mage outlives her party.",
          "genres": [{"mal_id": 2, "name": "Adventure"}, {"mal_id": 8, "name": "Drama"}],
          "trailer": {"embed_url": "https://www.youtube.com/embed/qgQ0Gz6jQ4k?enablejsapi=1",
                      "images": {"maximum_image_url": null, "large_image_url": "https://img.youtube.com/vi/qgQ0Gz6jQ4k/hqdefault.jpg"}},
          "aired": {"from": "2023-09-29T00:00:00+00:00"}
        },
        {
          "mal_id": 1,
          "title": "",
          "title_english": null,
          "images": {"webp": {"image_url": "https://cdn.myanimelist.net/b.webp"}},
          "year": null,
          "duration": "",
          "score": null,
          "trailer": {"embed_url": null}
        }
      ]
    }"#;

    fn fixture() -> Vec<JikanAnime> {
        serde_json::from_str::<JikanListResponse>(TOP_FIXTURE)
            .unwrap()
            .data
    }

    #[test]
    fn test_search_url_asks_for_one_hit() {
        let client = JikanClient::new("https://api.jikan.moe/v4").unwrap();
        assert_eq!(
            client.search_url("Spy x Family").unwrap().as_str(),
            "https://api.jikan.moe/v4/anime?q=Spy+x+Family&limit=1"
        );
    }

    #[test]
    fn test_catalog_entry_uses_jpg_image_and_duration_fallback() {
        let items = fixture();
        let first = catalog_entry(&items[0]);
        assert_eq!(first.id, 52991);
        assert_eq!(first.title, "Sousou no Frieren");
        assert_eq!(first.image, "https://cdn.myanimelist.net/a.jpg");
        assert_eq!(first.year, Some(2023));

        let second = catalog_entry(&items[1]);
        assert_eq!(second.title, "Unknown");
        assert_eq!(second.duration, "N/A");
        assert_eq!(second.image, "");
        assert_eq!(second.year, None);
    }

    #[test]
    fn test_featured_requires_trailer() {
        let items = fixture();
        let featured = featured_entry(&items[0]).unwrap();
        assert_eq!(featured.large_image_url.as_deref(), Some("https://cdn.myanimelist.net/a-l.jpg"));
        assert_eq!(
            featured.trailer_image_url.as_deref(),
            Some("https://img.youtube.com/vi/qgQ0Gz6jQ4k/hqdefault.jpg")
        );
        assert!(featured_entry(&items[1]).is_none());
    }

    #[test]
    fn test_jikan_details_banner_and_rating() {
        let items = fixture();
        let details = jikan_details(&items[0]);
        assert_eq!(details.banner_image.as_deref(), Some("https://cdn.myanimelist.net/a-l.jpg"));
        assert_eq!(details.genres, vec!["Adventure", "Drama"]);
        assert_eq!(details.rating, "9.3");

        let sparse = jikan_details(&items[1]);
        assert_eq!(sparse.banner_image.as_deref(), Some("https://cdn.myanimelist.net/b.webp"));
        assert_eq!(sparse.rating, "N/A");
        assert_eq!(sparse.synopsis, "No description available");
    }

    #[test]
    fn test_aired_from_parses_rfc3339() {
        let items = fixture();
        assert!(items[0].aired_from().is_some());
        assert!(items[1].aired_from().is_none());
    }
}
