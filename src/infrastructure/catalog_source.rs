//! HTML catalog source
//!
//! Binds the HTTP client and the page parsers to the catalog's URL
//! templates and exposes them through the source ports used by the
//! pipeline and the resolver.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::error::{FetchError, ParsingError};
use crate::application::sources::{PersonSource, SourceError, WorkSource};
use crate::domain::entities::{ScrapedPerson, ScrapedWork};
use crate::infrastructure::config::{AppConfig, ID_PLACEHOLDER, SourceConfig};
use crate::infrastructure::http_client::{FetchRequest, HttpClient};
use crate::infrastructure::parsing::{PageParser, PersonPageParser, WorkPageParser, parse_trailer_response};

pub struct HtmlCatalogSource {
    client: HttpClient,
    config: SourceConfig,
    work_parser: WorkPageParser,
    person_parser: PersonPageParser,
}

impl HtmlCatalogSource {
    pub fn new(client: HttpClient, config: SourceConfig) -> Result<Self, ParsingError> {
        Ok(Self {
            client,
            config,
            work_parser: WorkPageParser::new()?,
            person_parser: PersonPageParser::new()?,
        })
    }

    /// Build the HTTP client and the source from the application configuration
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = HttpClient::new(config.fetch.clone())?;
        Ok(Self::new(client, config.source.clone())?)
    }

    pub fn work_url(&self, external_id: i64) -> String {
        self.config.work_url_template.replace(ID_PLACEHOLDER, &external_id.to_string())
    }

    pub fn person_url(&self, external_id: i64) -> String {
        self.config.person_url_template.replace(ID_PLACEHOLDER, &external_id.to_string())
    }

    /// Look up the trailer embed for a work; `Ok(None)` when it has none
    pub async fn fetch_trailer_url(&self, external_id: i64) -> Result<Option<String>, FetchError> {
        let request = FetchRequest::post_form(
            self.config.trailer_endpoint.clone(),
            vec![("id".to_string(), external_id.to_string())],
        )
        .with_headers(&self.config.trailer_headers);

        let response = self.client.fetch(&request).await?;
        Ok(parse_trailer_response(&response.body))
    }

    async fn fetch_page(&self, url: String) -> Result<String, FetchError> {
        let request = FetchRequest::get(url).with_headers(&self.config.headers);
        Ok(self.client.fetch(&request).await?.body)
    }
}

#[async_trait]
impl WorkSource for HtmlCatalogSource {
    async fn fetch_work(&self, external_id: i64) -> Result<ScrapedWork, SourceError> {
        let body = self.fetch_page(self.work_url(external_id)).await?;
        let mut work = self.work_parser.parse_str(&body, external_id)?;

        // Trailer lookup failures only drop the trailer
        match self.fetch_trailer_url(external_id).await {
            Ok(trailer_url) => work.trailer_url = trailer_url,
            Err(e) => warn!("Trailer lookup failed for work {}: {}", external_id, e),
        }

        debug!("Parsed work {}: {}", external_id, work.title);
        Ok(work)
    }
}

#[async_trait]
impl PersonSource for HtmlCatalogSource {
    async fn fetch_person(&self, external_id: i64) -> Result<ScrapedPerson, SourceError> {
        let body = self.fetch_page(self.person_url(external_id)).await?;
        Ok(self.person_parser.parse_str(&body, external_id)?)
    }
}
