//! Work ("film") detail page parser
//!
//! The page has a title block, a poster side cover and an info table whose
//! rows are keyed by localized labels. Only the title and the info table are
//! required; every other field resolves to an absent or empty value.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{PageParser, ParsingError, ParsingResult, compile_selector, compile_selectors, element_text, non_empty_text, select_first};
use crate::domain::entities::{PersonRef, ScrapedWork};

const LABEL_COUNTRY: &str = "Страна";
const LABEL_RELEASE_DATE: &str = "Дата выхода";
const LABEL_AGE: &str = "Возраст";
const LABEL_DUBBING: &str = "В переводе";
const LABEL_TAGLINE: &str = "Слоган";

/// Localized month names (genitive) as printed in release dates
const MONTHS: [(&str, u32); 12] = [
    ("января", 1),
    ("февраля", 2),
    ("марта", 3),
    ("апреля", 4),
    ("мая", 5),
    ("июня", 6),
    ("июля", 7),
    ("августа", 8),
    ("сентября", 9),
    ("октября", 10),
    ("ноября", 11),
    ("декабря", 12),
];

pub struct WorkPageParser {
    title: Selector,
    info_table: Vec<Selector>,
    original_title: Selector,
    description: Selector,
    poster: Selector,
    row: Selector,
    cell: Selector,
    link: Selector,
    span: Selector,
    duration: Selector,
    rating: Selector,
    genre: Selector,
    actor: Selector,
    director: Selector,
    person_name: Selector,
    /// `<day> <month name> <year>`
    release_date: Regex,
}

impl WorkPageParser {
    pub fn new() -> ParsingResult<Self> {
        Ok(Self {
            title: compile_selector(".b-post__title > h1")?,
            info_table: compile_selectors(&["table.b-post__info", "table"])?,
            original_title: compile_selector(".b-post__origtitle")?,
            description: compile_selector(".b-post__description_text")?,
            poster: compile_selector(".b-sidecover img")?,
            row: compile_selector("tr")?,
            cell: compile_selector("td")?,
            link: compile_selector("a")?,
            span: compile_selector("span")?,
            duration: compile_selector(r#"[itemprop="duration"]"#)?,
            rating: compile_selector(".imdb .bold")?,
            genre: compile_selector(r#"[itemprop="genre"]"#)?,
            actor: compile_selector(r#"[itemprop="actor"]"#)?,
            director: compile_selector(r#"[itemprop="director"]"#)?,
            person_name: compile_selector(r#"[itemprop="name"]"#)?,
            release_date: Regex::new(r"(\d{1,2})\s+(\p{L}+)\s+(\d{1,4})")
                .map_err(|e| ParsingError::invalid_pattern("release date", e))?,
        })
    }

    /// Value cell (last `td`) of the info row whose label cell contains `label`
    fn info_value<'a>(&self, table: ElementRef<'a>, label: &str) -> Option<ElementRef<'a>> {
        table.select(&self.row).find_map(|row| {
            let mut cells = row.select(&self.cell);
            let label_cell = cells.next()?;
            if !element_text(label_cell).contains(label) {
                return None;
            }
            cells.last()
        })
    }

    /// Release date cell: `25 мая 1979 года`; an unknown month falls back to January
    pub fn parse_release_date(&self, text: &str) -> Option<NaiveDate> {
        let captures = self.release_date.captures(text)?;
        let month = captures[2].to_lowercase();
        let month = MONTHS
            .iter()
            .find(|(name, _)| *name == month)
            .map_or(1, |(_, number)| *number);

        NaiveDate::from_ymd_opt(captures[3].parse().ok()?, month, captures[1].parse().ok()?)
    }

    fn person_refs(&self, table: ElementRef<'_>, selector: &Selector) -> Vec<PersonRef> {
        table
            .select(selector)
            .filter_map(|element| {
                let value = element.value();
                let external_id = value.attr("data-id").and_then(|id| id.trim().parse::<i64>().ok());
                let Some(external_id) = external_id else {
                    debug!("Skipping person credit without a usable data-id");
                    return None;
                };
                let name = element
                    .select(&self.person_name)
                    .next()
                    .map_or_else(|| element_text(element), element_text);
                let profession = value.attr("data-job").unwrap_or_default().trim().to_lowercase();

                Some(PersonRef {
                    external_id,
                    name,
                    profession,
                })
            })
            .collect()
    }
}

impl PageParser for WorkPageParser {
    type Output = ScrapedWork;

    fn parse(&self, html: &Html, external_id: i64) -> ParsingResult<ScrapedWork> {
        let title = html
            .select(&self.title)
            .next()
            .map(element_text)
            .ok_or_else(|| ParsingError::required_field_missing("title", external_id))?;
        let table = select_first(html, &self.info_table)
            .ok_or_else(|| ParsingError::required_field_missing("info table", external_id))?;

        let mut work = ScrapedWork::new(external_id, title);

        work.original_title = html.select(&self.original_title).next().and_then(non_empty_text);
        work.synopsis = html
            .select(&self.description)
            .next()
            .and_then(non_empty_text)
            .or_else(|| self.info_value(table, LABEL_TAGLINE).and_then(non_empty_text));
        work.country = self
            .info_value(table, LABEL_COUNTRY)
            .and_then(|cell| cell.select(&self.link).next().or(Some(cell)))
            .and_then(non_empty_text);
        work.release_date = self
            .info_value(table, LABEL_RELEASE_DATE)
            .and_then(|cell| self.parse_release_date(&element_text(cell)));
        work.rating = table
            .select(&self.rating)
            .next()
            .and_then(|el| element_text(el).replace(',', ".").parse::<f64>().ok());
        work.duration_minutes = table
            .select(&self.duration)
            .next()
            .and_then(|el| parse_duration(&element_text(el)));
        work.age_rating = self
            .info_value(table, LABEL_AGE)
            .and_then(|cell| cell.select(&self.span).next().or(Some(cell)))
            .and_then(|el| parse_age_rating(&element_text(el)));
        work.dubbings = self
            .info_value(table, LABEL_DUBBING)
            .map(|cell| split_dubbings(&element_text(cell)))
            .unwrap_or_default();
        work.genres = table.select(&self.genre).filter_map(non_empty_text).collect();
        work.actors = self.person_refs(table, &self.actor);
        work.directors = self.person_refs(table, &self.director);
        work.poster_url = html
            .select(&self.poster)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);

        Ok(work)
    }
}

/// Duration cell: plain minutes (`128 мин.`) or `H:MM`
pub fn parse_duration(text: &str) -> Option<i32> {
    let token = text.split_whitespace().next()?;
    if let Ok(minutes) = token.parse::<i32>() {
        return Some(minutes);
    }
    let (hours, minutes) = token.split_once(':')?;
    hours
        .parse::<i32>()
        .ok()?
        .checked_mul(60)?
        .checked_add(minutes.parse::<i32>().ok()?)
}

/// Age rating with its trailing unit character stripped (`18+` → 18)
pub fn parse_age_rating(text: &str) -> Option<i32> {
    let mut chars = text.trim().chars();
    chars.next_back()?;
    chars.as_str().trim().parse().ok()
}

/// Dubbing list split on `", "` and `" и "`
pub fn split_dubbings(text: &str) -> Vec<String> {
    text.replace(" и ", ", ")
        .split(", ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
