//! Per-source listing and article extraction.
//!
//! Each source belongs to a site family with its own HTML shape; the family
//! profile carries the selectors so extraction stays data-driven. Listings are
//! reverse-chronological, so pagination stops as soon as an entire page falls
//! before the requested window.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::RawArticle;
use crate::scrape::dates;
use crate::sources::{ResolvedSource, SiteFamily};

// Backstop for portals that ignore their pagination parameter.
const MAX_LISTING_PAGES: usize = 200;

pub fn http_client(timeout_secs: u64, user_agent: &str) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()
        .expect("Failed to create HTTP client")
}

fn sel(source: &'static str) -> Selector {
    Selector::parse(source).expect("static selector")
}

#[derive(Debug, Clone, Copy)]
pub enum Pagination {
    /// Plone-style item offset (`?b_start:int=30`).
    Offset { param: &'static str, step: usize },
    /// Simple page counter (`?page=2`).
    Page { param: &'static str },
}

/// Selector set for one site family.
pub struct FamilyProfile {
    pub tile: &'static str,
    pub tile_link: &'static str,
    pub tile_date: &'static str,
    pub tile_category: Option<&'static str>,
    /// Candidate body containers, most specific first.
    pub content: &'static [&'static str],
    pub image: Option<&'static str>,
    pub video: Option<&'static str>,
    pub tags: Option<&'static str>,
    pub editorial_lead: Option<&'static str>,
    pub subtitle: Option<&'static str>,
    pub fixed_category: Option<&'static str>,
    pub pagination: Pagination,
}

static GOVBR: FamilyProfile = FamilyProfile {
    tile: "article.tileItem",
    tile_link: "a.summary.url",
    tile_date: "span.documentByLine span.date",
    tile_category: Some("span.subtitle"),
    content: &["div#parent-fieldname-text", "div#content"],
    image: Some("div#content img"),
    video: None,
    tags: Some("div#content a.link-subject"),
    editorial_lead: None,
    subtitle: Some("div#content div.documentDescription"),
    fixed_category: None,
    pagination: Pagination::Offset {
        param: "b_start:int",
        step: 30,
    },
};

static AGENCIA_BRASIL: FamilyProfile = FamilyProfile {
    tile: "article.materia",
    tile_link: "a",
    tile_date: "span.data",
    tile_category: None,
    content: &["div.conteudo-noticia"],
    image: Some("div.conteudo-noticia img"),
    video: None,
    tags: Some("div.tags a"),
    editorial_lead: None,
    subtitle: None,
    fixed_category: Some("Notícias"),
    pagination: Pagination::Page { param: "page" },
};

static TV_BRASIL: FamilyProfile = FamilyProfile {
    tile: "article.card",
    tile_link: "a",
    tile_date: "span.data",
    tile_category: None,
    content: &["article"],
    image: Some("article img"),
    video: Some("iframe"),
    tags: Some("div.tags a"),
    editorial_lead: Some("h4.txtNoticias"),
    subtitle: None,
    fixed_category: Some("Notícias"),
    pagination: Pagination::Page { param: "page" },
};

impl FamilyProfile {
    pub fn for_family(family: SiteFamily) -> &'static FamilyProfile {
        match family {
            SiteFamily::GovBr => &GOVBR,
            SiteFamily::AgenciaBrasil => &AGENCIA_BRASIL,
            SiteFamily::TvBrasil => &TV_BRASIL,
        }
    }
}

/// One item tile on a listing page.
#[derive(Debug, Clone)]
pub struct ListingItem {
    pub title: String,
    pub url: String,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Pure listing-page parse. Tiles without a link are ignored.
pub fn parse_listing(html: &str, profile: &FamilyProfile, base: &Url) -> Vec<ListingItem> {
    let doc = Html::parse_document(html);
    let tile_sel = sel(profile.tile);
    let link_sel = sel(profile.tile_link);
    let date_sel = sel(profile.tile_date);
    let category_sel = profile.tile_category.map(sel);

    let mut items = Vec::new();
    for tile in doc.select(&tile_sel) {
        let Some((href, title)) = tile
            .select(&link_sel)
            .find_map(|a| a.value().attr("href").map(|href| (href, element_text(a))))
        else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            warn!(href, "skipping tile with unresolvable link");
            continue;
        };

        let date = tile
            .select(&date_sel)
            .next()
            .and_then(|el| dates::parse_listing_date(&el.text().collect::<String>()));
        let category = category_sel
            .as_ref()
            .and_then(|s| tile.select(s).next())
            .map(element_text)
            .filter(|c| !c.is_empty());

        items.push(ListingItem {
            title,
            url: url.to_string(),
            date,
            category,
        });
    }
    items
}

pub struct ArticleFields {
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub tags: Vec<String>,
    pub editorial_lead: Option<String>,
    pub subtitle: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    pub updated: Option<DateTime<FixedOffset>>,
    pub strategy: Option<&'static str>,
}

/// Pure article-page parse: body text plus the optional editorial fields,
/// and the publication/modification times from the strategy chain.
pub fn parse_article(html: &str, profile: &FamilyProfile) -> ArticleFields {
    let doc = Html::parse_document(html);

    let mut content = String::new();
    for &candidate in profile.content {
        let text = doc
            .select(&sel(candidate))
            .map(|el| el.text().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");
        let cleaned = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !cleaned.is_empty() {
            content = cleaned;
            break;
        }
    }

    let first_attr = |selector: Option<&'static str>, attr: &str| -> Option<String> {
        selector.and_then(|s| {
            doc.select(&sel(s))
                .find_map(|el| el.value().attr(attr))
                .map(|v| v.to_string())
        })
    };
    let first_text = |selector: Option<&'static str>| -> Option<String> {
        selector
            .and_then(|s| doc.select(&sel(s)).next())
            .map(element_text)
            .filter(|t| !t.is_empty())
    };

    let tags = profile
        .tags
        .map(|s| {
            doc.select(&sel(s))
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let resolved = dates::resolve_article_datetimes(&doc);

    ArticleFields {
        content,
        image_url: first_attr(profile.image, "src"),
        video_url: first_attr(profile.video, "src"),
        tags,
        editorial_lead: first_text(profile.editorial_lead),
        subtitle: first_text(profile.subtitle),
        published: resolved.published,
        updated: resolved.updated,
        strategy: resolved.strategy,
    }
}

/// Scrapes one source's listing within an inclusive date window.
pub struct SiteExtractor {
    client: Client,
    source: ResolvedSource,
    min_date: NaiveDate,
    max_date: NaiveDate,
}

impl SiteExtractor {
    pub fn new(client: Client, source: ResolvedSource, min_date: NaiveDate, max_date: NaiveDate) -> Self {
        Self {
            client,
            source,
            min_date,
            max_date,
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(
                anyhow::anyhow!("failed to fetch {}: HTTP {}", url, response.status()).into(),
            );
        }
        Ok(response.text().await?)
    }

    fn listing_url(profile: &FamilyProfile, base: &Url, page_index: usize) -> Url {
        if page_index == 0 {
            return base.clone();
        }
        let mut url = base.clone();
        match profile.pagination {
            Pagination::Offset { param, step } => {
                url.query_pairs_mut()
                    .append_pair(param, &(page_index * step).to_string());
            }
            Pagination::Page { param } => {
                url.query_pairs_mut()
                    .append_pair(param, &page_index.to_string());
            }
        }
        url
    }

    /// Walk listing pages until a whole page falls before the window, and
    /// extract every qualifying article. A listing fetch failure fails the
    /// source; a single article failure only marks that item.
    pub async fn scrape(&self, cancel: &CancellationToken) -> Result<Vec<RawArticle>> {
        let base = Url::parse(&self.source.url)
            .map_err(|e| AppError::Scrape(format!("invalid listing url {}: {}", self.source.url, e)))?;
        let profile = FamilyProfile::for_family(self.source.family);

        let mut articles = Vec::new();
        let mut previous_first: Option<String> = None;

        for page_index in 0..MAX_LISTING_PAGES {
            if cancel.is_cancelled() {
                return Err(AppError::Scrape("scrape cancelled".to_string()));
            }

            let url = Self::listing_url(profile, &base, page_index);
            let html = self.fetch_page(url.as_str()).await?;
            let items = parse_listing(&html, profile, &base);
            if items.is_empty() {
                break;
            }
            // Some portals ignore the pagination parameter and serve the
            // first page again.
            if previous_first.as_deref() == Some(items[0].url.as_str()) {
                break;
            }
            previous_first = Some(items[0].url.clone());
            debug!(source = %self.source.key, page = page_index, tiles = items.len(), "parsed listing page");

            let mut page_has_current = false;
            for item in &items {
                match item.date {
                    Some(date) if date < self.min_date => continue,
                    Some(date) if date > self.max_date => {
                        page_has_current = true;
                        continue;
                    }
                    _ => page_has_current = true,
                }
                if cancel.is_cancelled() {
                    return Err(AppError::Scrape("scrape cancelled".to_string()));
                }
                articles.push(self.scrape_article(profile, item).await);
            }
            if !page_has_current {
                break;
            }
        }

        info!(source = %self.source.key, count = articles.len(), "extracted articles in window");
        Ok(articles)
    }

    async fn scrape_article(&self, profile: &FamilyProfile, item: &ListingItem) -> RawArticle {
        let html = match self.fetch_page(&item.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(source = %self.source.key, url = %item.url, error = %e, "article fetch failed");
                return RawArticle::failed(&self.source.key, &item.title, &item.url, e);
            }
        };

        let fields = parse_article(&html, profile);

        let (published, strategy) = match fields.published {
            Some(published) => (Some(published), fields.strategy.unwrap_or("label_text")),
            None => match item.date.and_then(dates::datetime_from_listing_date) {
                Some(published) => (Some(published), "listing_date"),
                None => (None, "none"),
            },
        };
        if published.is_some() {
            debug!(source = %self.source.key, url = %item.url, strategy, "resolved publication time");
        } else {
            warn!(source = %self.source.key, url = %item.url, "no publication time resolved; item will be dropped");
        }

        RawArticle {
            source_key: self.source.key.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            content: fields.content,
            image_url: fields.image_url,
            video_url: fields.video_url,
            tags: fields.tags,
            category: item
                .category
                .clone()
                .or_else(|| profile.fixed_category.map(String::from)),
            editorial_lead: fields.editorial_lead,
            subtitle: fields.subtitle,
            published_at: published,
            updated_at: fields.updated,
            extracted_at: Some(Utc::now()),
            error: None,
        }
    }
}

#[async_trait::async_trait]
impl crate::scrape::SourceScraper for SiteExtractor {
    fn key(&self) -> &str {
        &self.source.key
    }

    async fn scrape(&self, cancel: &CancellationToken) -> Result<Vec<RawArticle>> {
        SiteExtractor::scrape(self, cancel).await
    }
}
