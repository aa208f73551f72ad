//! HTML parsing infrastructure for catalog pages
//!
//! Parsers turn one fetched page into one typed record. Selectors are
//! compiled when a parser is built; `scraper::Html` lives only for the
//! duration of a synchronous parse call.

pub mod person_page_parser;
pub mod trailer_parser;
pub mod work_page_parser;

pub use crate::application::error::{ParsingError, ParsingResult};
pub use person_page_parser::PersonPageParser;
pub use trailer_parser::parse_trailer_response;
pub use work_page_parser::WorkPageParser;

use scraper::{ElementRef, Html, Selector};

/// Page parser producing one record per external id
pub trait PageParser {
    type Output;

    /// Parse an already built document
    fn parse(&self, html: &Html, external_id: i64) -> ParsingResult<Self::Output>;

    /// Parse a raw response body
    fn parse_str(&self, body: &str, external_id: i64) -> ParsingResult<Self::Output> {
        let html = Html::parse_document(body);
        self.parse(&html, external_id)
    }
}

/// Compile selector strings into Selector objects, all of them must be valid
pub(crate) fn compile_selectors(selector_strings: &[&str]) -> ParsingResult<Vec<Selector>> {
    selector_strings.iter().map(|s| compile_selector(s)).collect()
}

pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// First element matching any selector, tried in order
pub(crate) fn select_first<'a>(html: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|selector| html.select(selector).next())
}

/// Concatenated, trimmed text content of an element
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Non-empty trimmed text, `None` for blank elements
pub(crate) fn non_empty_text(element: ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    (!text.is_empty()).then_some(text)
}
