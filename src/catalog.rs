use anyhow::Result;
use regex::Regex;
use std::{cmp::Ordering, sync::LazyLock};
use tracing::{debug, error, warn};

use crate::cache::{
    BEST_ANIME_KEY, POPULAR_ANIME_KEY, RECENT_ANIME_KEY, ResponseCache, anime_details_key,
};
use crate::error::ApiError;
use crate::providers::{
    EpisodeProvider, MetadataProvider,
    jikan::{self, JikanAnime},
    zoro::{self, ZoroSearchItem},
};
use crate::types::{
    AnimeDetails, CatalogEntry, DetailPage, EpisodeStream, FeaturedEntry, MediaKind, SearchPage,
    SearchResult,
};

static YEAR_IN_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{4})\)").expect("valid year regex"));

pub struct CatalogLimits {
    pub rows: usize,
    pub featured: usize,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self {
            rows: 20,
            featured: 5,
        }
    }
}

/// Cached access to both upstream APIs, shaped for the views.
pub struct Catalog<'a, M, E> {
    metadata: &'a M,
    episodes: &'a E,
    cache: &'a ResponseCache,
    limits: CatalogLimits,
}

impl<'a, M: MetadataProvider, E: EpisodeProvider> Catalog<'a, M, E> {
    pub fn new(metadata: &'a M, episodes: &'a E, cache: &'a ResponseCache) -> Self {
        Self {
            metadata,
            episodes,
            cache,
            limits: CatalogLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: CatalogLimits) -> Self {
        self.limits = limits;
        self
    }

    fn store<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.cache.set(key, value) {
            warn!(key, error = %err, "failed to cache response");
        }
    }

    fn rows_from(&self, items: &[JikanAnime]) -> Vec<CatalogEntry> {
        items
            .iter()
            .take(self.limits.rows)
            .map(jikan::catalog_entry)
            .collect()
    }

    pub async fn best_anime(&self) -> Result<Vec<CatalogEntry>> {
        if let Some(cached) = self.cache.get(BEST_ANIME_KEY) {
            return Ok(cached);
        }
        let items = self.metadata.top_anime().await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.rows_from(&items);
        self.store(BEST_ANIME_KEY, &rows);
        Ok(rows)
    }

    pub async fn popular_anime(&self) -> Result<Vec<CatalogEntry>> {
        if let Some(cached) = self.cache.get(POPULAR_ANIME_KEY) {
            return Ok(cached);
        }
        let items = self.metadata.season_now(false).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.rows_from(&items);
        self.store(POPULAR_ANIME_KEY, &rows);
        Ok(rows)
    }

    /// Newest first by air date. Failures yield an empty row.
    pub async fn recent_anime(&self) -> Vec<CatalogEntry> {
        if let Some(cached) = self.cache.get(RECENT_ANIME_KEY) {
            return cached;
        }
        let items = match self.metadata.season_now(true).await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "error fetching recent anime");
                return Vec::new();
            }
        };
        if items.is_empty() {
            return Vec::new();
        }

        let mut dated: Vec<_> = items
            .iter()
            .filter_map(|anime| anime.aired_from().map(|from| (from, anime)))
            .collect();
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        let rows: Vec<CatalogEntry> = dated
            .into_iter()
            .take(self.limits.rows)
            .map(|(_, anime)| {
                let mut entry = jikan::catalog_entry(anime);
                entry.aired = anime.aired.as_ref().and_then(|a| a.from.clone());
                entry
            })
            .collect();
        self.store(RECENT_ANIME_KEY, &rows);
        rows
    }

    /// Top entries that carry a trailer. Never cached.
    pub async fn featured(&self) -> Vec<FeaturedEntry> {
        match self.metadata.top_anime().await {
            Ok(items) => items
                .iter()
                .filter_map(jikan::featured_entry)
                .take(self.limits.featured)
                .collect(),
            Err(err) => {
                error!(error = %err, "error fetching featured anime");
                Vec::new()
            }
        }
    }

    /// Never fails: upstream problems produce a placeholder that is not cached.
    pub async fn anime_details(&self, id: &str) -> AnimeDetails {
        let key = anime_details_key(id);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let info = match self.episodes.info(id).await {
            Ok(info) => info,
            Err(err) => {
                error!(id, error = %err, "error fetching anime details");
                return AnimeDetails::placeholder();
            }
        };
        match zoro::anime_details(&info) {
            Some(details) => {
                self.store(&key, &details);
                details
            }
            None => {
                warn!(id, "anime details payload missing title or episodes");
                AnimeDetails::placeholder()
            }
        }
    }

    pub async fn detail_page(&self, id: &str) -> DetailPage {
        let details = self.anime_details(id).await;
        let enrichment = if details.is_placeholder() {
            None
        } else {
            match self.metadata.search_first(&details.title).await {
                Ok(hit) => hit.as_ref().map(jikan::jikan_details),
                Err(err) => {
                    error!(title = %details.title, error = %err, "error fetching Jikan data");
                    None
                }
            }
        };
        merge_detail_page(id, details, enrichment)
    }

    pub async fn search(&self, query: &str, page: u32) -> SearchPage {
        match self.episodes.search(query, page).await {
            Ok(response) => SearchPage {
                results: rank_results(
                    query,
                    response.results.iter().map(search_result).collect(),
                ),
                total_pages: response.total_pages,
            },
            Err(err) => {
                error!(query, page, error = %err, "error fetching search results");
                SearchPage::default()
            }
        }
    }

    /// Maps a catalog title to the episode provider's id for that show.
    /// A 404 from the provider means no match, not a failure.
    pub async fn resolve_title(&self, title: &str) -> Result<Option<String>> {
        match self.episodes.search(title, 1).await {
            Ok(response) => Ok(response.results.into_iter().next().map(|r| r.id)),
            Err(err)
                if err
                    .downcast_ref::<ApiError>()
                    .is_some_and(ApiError::is_not_found) =>
            {
                debug!(title, "no episode provider match");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn episode_stream(&self, episode_id: &str, server: &str) -> Result<Option<EpisodeStream>> {
        let watch = self.episodes.watch(episode_id, server).await?;
        Ok(zoro::episode_stream(watch))
    }
}

pub fn merge_detail_page(
    id: &str,
    details: AnimeDetails,
    enrichment: Option<crate::types::JikanDetails>,
) -> DetailPage {
    let fallback_banner = Some(details.image.clone()).filter(|img| !img.is_empty());
    match enrichment {
        Some(extra) => DetailPage {
            id: id.to_string(),
            title: details.title,
            banner: extra.banner_image.or(fallback_banner),
            rating: extra.rating,
            synopsis: extra.synopsis,
            genres: extra.genres,
            episodes: details.episodes,
        },
        None => DetailPage {
            id: id.to_string(),
            title: details.title,
            banner: fallback_banner,
            rating: details.rating,
            synopsis: details.synopsis,
            genres: Vec::new(),
            episodes: details.episodes,
        },
    }
}

pub fn search_result(item: &ZoroSearchItem) -> SearchResult {
    let year = YEAR_IN_TITLE
        .captures(&item.title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let kind = if item.title.to_lowercase().contains("movie") {
        MediaKind::Movie
    } else {
        MediaKind::TvSeries
    };
    SearchResult {
        id: item.id.clone(),
        title: item.title.clone(),
        image: item.image.clone(),
        year,
        kind,
        duration: item
            .duration
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| String::from("Unknown")),
    }
}

fn year_value(year: Option<&String>) -> u32 {
    year.and_then(|y| y.parse().ok()).unwrap_or(0)
}

fn compare_results(a: &SearchResult, b: &SearchResult, query: &str) -> Ordering {
    let a_exact = a.title.to_lowercase() == query;
    let b_exact = b.title.to_lowercase() == query;
    if a_exact != b_exact {
        return if a_exact { Ordering::Less } else { Ordering::Greater };
    }
    if a.kind != b.kind {
        return if a.kind == MediaKind::TvSeries {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    year_value(b.year.as_ref()).cmp(&year_value(a.year.as_ref()))
}

/// Exact title match first, then series before movies, then newest year.
/// Ties keep the upstream order.
pub fn rank_results(query: &str, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    let query = query.to_lowercase();
    results.sort_by(|a, b| compare_results(a, b, &query));
    results
}
