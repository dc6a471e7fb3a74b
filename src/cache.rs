use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const BEST_ANIME_KEY: &str = "bestAnimeData";
pub const POPULAR_ANIME_KEY: &str = "popularAnimeData";
pub const RECENT_ANIME_KEY: &str = "recentAnimeData";
pub const RECENT_EPISODES_KEY: &str = "recentEpisodesData";

/// Keys dropped every time the app starts so the "recent" rows stay fresh.
pub const STARTUP_CLEARED_KEYS: &[&str] = &[RECENT_EPISODES_KEY, RECENT_ANIME_KEY];

const ENTRY_EXTENSION: &str = "json";

pub fn anime_details_key(id: &str) -> String {
    format!("animeDetailsData-{id}")
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<T> {
    key: String,
    stored_at: DateTime<Utc>,
    data: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryInfo {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CacheEntryInfo {
    pub fn age_display(&self) -> String {
        let minutes = (Utc::now() - self.stored_at).num_minutes();
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Unbounded key/value store for mapped API responses.
///
/// Entries never expire. They are removed only by [`ResponseCache::remove`],
/// [`ResponseCache::clear`] or the startup routine.
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", cache_file_stem(key)))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(key, error = %err, "failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_str::<StoredEntry<T>>(&raw) {
            Ok(entry) if entry.key == key => {
                debug!(key, "cache hit");
                Some(entry.data)
            }
            Ok(entry) => {
                warn!(key, stored = %entry.key, "cache entry belongs to another key");
                None
            }
            Err(err) => {
                warn!(key, error = %err, "ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let entry = StoredEntry {
            key: key.to_string(),
            stored_at: Utc::now(),
            data: value,
        };
        let path = self.entry_path(key);
        let data = serde_json::to_string(&entry)
            .with_context(|| format!("failed to serialize cache entry {key}"))?;
        fs::write(&path, data)
            .with_context(|| format!("failed to write cache entry {}", path.display()))?;
        debug!(key, "cache store");
        Ok(())
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove cache entry {}", path.display()))
            }
        }
    }

    pub fn clear_startup_keys(&self) -> Result<()> {
        for key in STARTUP_CLEARED_KEYS {
            if self.remove(key)? {
                debug!(key, "cleared on startup");
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove cache entry {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn entries(&self) -> Result<Vec<CacheEntryInfo>> {
        let mut entries = Vec::new();
        for path in self.entry_files()? {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read cache entry {}", path.display()))?;
            let Ok(entry) = serde_json::from_str::<StoredEntry<serde_json::Value>>(&raw) else {
                warn!(path = %path.display(), "skipping unreadable cache entry");
                continue;
            };
            entries.push(CacheEntryInfo {
                key: entry.key,
                stored_at: entry.stored_at,
                size_bytes: raw.len() as u64,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let read_dir = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list cache directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for item in read_dir {
            let path = item?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Percent-encodes a key into a file stem. Distinct keys never share a file.
pub fn cache_file_stem(key: &str) -> String {
    // '*' is left as-is by byte_serialize but is not a portable file name character.
    let encoded = url::form_urlencoded::byte_serialize(key.as_bytes())
        .collect::<String>()
        .replace('*', "%2A");
    if encoded.is_empty() {
        // byte_serialize never emits a bare '%'.
        String::from("%")
    } else {
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CatalogEntry;

    fn temp_cache(name: &str) -> ResponseCache {
        let dir = std::env::temp_dir().join(format!(
            "anistream-cache-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        ResponseCache::open(dir).unwrap()
    }

    fn sample_entry() -> CatalogEntry {
        CatalogEntry {
            id: 5114,
            title: "Fullmetal Alchemist: Brotherhood".to_string(),
            image: "https://cdn.myanimelist.net/images/anime/1223/96541.jpg".to_string(),
            year: Some(2009),
            duration: "24 min per ep".to_string(),
            aired: None,
        }
    }

    #[test]
    fn test_get_returns_what_set_stored() {
        let cache = temp_cache("roundtrip");
        assert!(cache.get::<Vec<CatalogEntry>>(BEST_ANIME_KEY).is_none());
        cache.set(BEST_ANIME_KEY, &vec![sample_entry()]).unwrap();
        let cached: Vec<CatalogEntry> = cache.get(BEST_ANIME_KEY).unwrap();
        assert_eq!(cached, vec![sample_entry()]);
    }

    #[test]
    fn test_startup_clear_only_touches_recent_keys() {
        let cache = temp_cache("startup");
        cache.set(BEST_ANIME_KEY, &vec![sample_entry()]).unwrap();
        cache.set(RECENT_ANIME_KEY, &vec![sample_entry()]).unwrap();
        cache.set(RECENT_EPISODES_KEY, &vec![1, 2, 3]).unwrap();
        cache.set(&anime_details_key("one-piece-100"), &"details").unwrap();

        cache.clear_startup_keys().unwrap();

        assert!(cache.get::<Vec<CatalogEntry>>(RECENT_ANIME_KEY).is_none());
        assert!(cache.get::<Vec<u32>>(RECENT_EPISODES_KEY).is_none());
        assert!(cache.get::<Vec<CatalogEntry>>(BEST_ANIME_KEY).is_some());
        assert!(
            cache
                .get::<String>(&anime_details_key("one-piece-100"))
                .is_some()
        );
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let cache = temp_cache("corrupt");
        fs::write(cache.dir().join("popularAnimeData.json"), "{not json").unwrap();
        assert!(cache.get::<Vec<CatalogEntry>>(POPULAR_ANIME_KEY).is_none());
    }

    #[test]
    fn test_entries_lists_unsanitized_keys_and_clear_empties() {
        let cache = temp_cache("list");
        cache.set(&anime_details_key("naruto/1"), &"x").unwrap();
        cache.set(POPULAR_ANIME_KEY, &"y").unwrap();

        let keys: Vec<String> = cache.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["animeDetailsData-naruto/1", "popularAnimeData"]);

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.entries().unwrap().is_empty());
        assert!(!cache.remove(POPULAR_ANIME_KEY).unwrap());
    }

    #[test]
    fn test_cache_file_stem_is_unique_per_key() {
        assert_eq!(cache_file_stem("bestAnimeData"), "bestAnimeData");
        assert_eq!(
            cache_file_stem("animeDetailsData-spy x family"),
            "animeDetailsData-spy+x+family"
        );
        assert_ne!(cache_file_stem("a/b"), cache_file_stem("a_b"));
        assert_ne!(cache_file_stem("a b"), cache_file_stem("a+b"));
        assert_ne!(cache_file_stem(""), cache_file_stem("_"));
        assert_eq!(cache_file_stem("a*b"), "a%2Ab");
    }

    #[test]
    fn test_similar_keys_do_not_share_entries() {
        let cache = temp_cache("distinct");
        cache.set(&anime_details_key("a/b"), &"show A/B").unwrap();
        assert!(cache.get::<String>(&anime_details_key("a_b")).is_none());

        cache.set(&anime_details_key("a_b"), &"show A_B").unwrap();
        assert_eq!(
            cache.get::<String>(&anime_details_key("a/b")).as_deref(),
            Some("show A/B")
        );
        assert!(cache.remove(&anime_details_key("a_b")).unwrap());
        assert!(cache.get::<String>(&anime_details_key("a/b")).is_some());
    }

    #[test]
    fn test_entry_stored_under_another_key_is_a_miss() {
        let cache = temp_cache("mismatch");
        cache.set(BEST_ANIME_KEY, &"best").unwrap();
        fs::copy(
            cache.dir().join("bestAnimeData.json"),
            cache.dir().join("popularAnimeData.json"),
        )
        .unwrap();
        assert!(cache.get::<String>(POPULAR_ANIME_KEY).is_none());
    }
}
