use anyhow::Result;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{build_http_client, fetch_text};
use crate::types::ScrapedAnime;

const SERVICE: &str = "top-anime site";

pub struct GojoScraper {
    client: Client,
    url: Url,
}

impl GojoScraper {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            url: Url::parse(url)?,
        })
    }

    pub async fn scrape_top(&self) -> Result<Vec<ScrapedAnime>> {
        let html = fetch_text(&self.client, SERVICE, &self.url).await?;
        Ok(parse_top_anime(&html))
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub fn parse_top_anime(html: &str) -> Vec<ScrapedAnime> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".anif-block-ul li");
    let name_sel = selector(".film-name a");
    let poster_sel = selector(".film-poster-img");
    let eps_sel = selector(".tick-item.tick-eps");

    doc.select(&item_sel)
        .map(|item| {
            let name = item.select(&name_sel).next();
            ScrapedAnime {
                title: name.map(text_of).unwrap_or_default(),
                image: item
                    .select(&poster_sel)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(str::to_string),
                link: name
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string),
                episode_count: item.select(&eps_sel).next().map(text_of).unwrap_or_default(),
            }
        })
        .collect()
}
