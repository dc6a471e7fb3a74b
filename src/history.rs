use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dialoguer::{Select, theme::ColorfulTheme};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    pub show_id: String,
    pub show_title: String,
    pub episode_id: String,
    pub episode_number: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

impl History {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read history file {}", path.display()))?;
        let history = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse history file {}", path.display()))?;
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("failed to write history file {}", path.display()))?;
        Ok(())
    }

    /// One entry per show, most recent first.
    pub fn upsert(&mut self, entry: HistoryEntry) {
        self.entries.retain(|e| e.show_id != entry.show_id);
        self.entries.insert(0, entry);
    }

    pub fn last_watched(&self, show_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.show_id == show_id)
    }

    pub fn select_entry(&self) -> Result<Option<HistoryEntry>> {
        if self.entries.is_empty() {
            println!("History is empty.");
            return Ok(None);
        }

        let items: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "{} \u{00b7} episode {} \u{00b7} watched {}",
                    entry.show_title,
                    entry.episode_number,
                    entry.watched_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();

        let selection = Select::with_theme(&theme())
            .with_prompt("Select a show to resume (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.map(|idx| self.entries[idx].clone()))
    }
}

pub fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}
