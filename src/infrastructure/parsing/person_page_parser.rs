//! Person ("maker") detail page parser

use scraper::{Html, Selector};

use super::{PageParser, ParsingError, ParsingResult, compile_selector, element_text, non_empty_text};
use crate::domain::entities::normalize_profession;
use crate::domain::entities::ScrapedPerson;

pub struct PersonPageParser {
    name: Selector,
    original_name: Selector,
    birth_date: Selector,
    profession: Selector,
}

impl PersonPageParser {
    pub fn new() -> ParsingResult<Self> {
        Ok(Self {
            name: compile_selector(".t1")?,
            original_name: compile_selector(".t2")?,
            birth_date: compile_selector("time[datetime]")?,
            profession: compile_selector(r#"[itemprop="jobTitle"]"#)?,
        })
    }
}

impl PageParser for PersonPageParser {
    type Output = ScrapedPerson;

    fn parse(&self, html: &Html, external_id: i64) -> ParsingResult<ScrapedPerson> {
        let name = html
            .select(&self.name)
            .next()
            .map(element_text)
            .ok_or_else(|| ParsingError::required_field_missing("name", external_id))?;

        let mut professions: Vec<String> = Vec::new();
        for profession in html.select(&self.profession).map(element_text) {
            let profession = normalize_profession(&profession);
            if !profession.is_empty() && !professions.contains(&profession) {
                professions.push(profession);
            }
        }

        Ok(ScrapedPerson {
            external_id,
            name,
            original_name: html.select(&self.original_name).next().and_then(non_empty_text),
            birth_date: html
                .select(&self.birth_date)
                .next()
                .and_then(|time| time.value().attr("datetime"))
                .map(|date| date.trim().to_string())
                .filter(|date| !date.is_empty()),
            professions,
        })
    }
}
