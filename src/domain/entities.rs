//! Core entities of the film catalog
//!
//! Scraped records (`Scraped*`) are the typed output of the page parsers.
//! Stored records (`Work`, `Person`, `ReferenceEntry`) mirror rows in the
//! catalog store, and `New*` values are what the resolver hands to the store
//! for creation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Surrogate key of a stored work
    WorkId
);
entity_id!(
    /// Surrogate key of a stored person
    PersonId
);
entity_id!(GenreId);
entity_id!(DubbingId);

/// Name-keyed lookup tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Genre,
    Dubbing,
    Profession,
}

impl ReferenceKind {
    /// Backing table name in the relational store
    pub const fn table(self) -> &'static str {
        match self {
            Self::Genre => "genres",
            Self::Dubbing => "dubbings",
            Self::Profession => "professions",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Genre => "genre",
            Self::Dubbing => "dubbing",
            Self::Profession => "profession",
        };
        f.write_str(label)
    }
}

/// A stored genre / dubbing / profession row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: i64,
    pub name: String,
}

/// Person reference embedded in a work page (actor or director credit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRef {
    pub external_id: i64,
    pub name: String,
    /// Raw, lower-cased profession label from the credit
    pub profession: String,
}

/// Typed record extracted from a work ("film") detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedWork {
    pub external_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub country: Option<String>,
    pub trailer_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub age_rating: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub dubbings: Vec<String>,
    #[serde(default)]
    pub actors: Vec<PersonRef>,
    #[serde(default)]
    pub directors: Vec<PersonRef>,
}

impl ScrapedWork {
    /// Minimal record with only the required fields set
    pub fn new(external_id: i64, title: impl Into<String>) -> Self {
        Self {
            external_id,
            title: title.into(),
            original_title: None,
            poster_url: None,
            synopsis: None,
            country: None,
            trailer_url: None,
            release_date: None,
            rating: None,
            duration_minutes: None,
            age_rating: None,
            genres: Vec::new(),
            dubbings: Vec::new(),
            actors: Vec::new(),
            directors: Vec::new(),
        }
    }

    /// All person credits of this work, actors first
    pub fn person_refs(&self) -> impl Iterator<Item = &PersonRef> {
        self.actors.iter().chain(self.directors.iter())
    }

    /// Scalar columns of the work, without relations
    pub fn to_new_work(&self) -> NewWork {
        NewWork {
            external_id: self.external_id,
            title: self.title.clone(),
            original_title: self.original_title.clone(),
            poster_url: self.poster_url.clone(),
            synopsis: self.synopsis.clone(),
            country: self.country.clone(),
            trailer_url: self.trailer_url.clone(),
            release_date: self.release_date,
            rating: self.rating,
            duration_minutes: self.duration_minutes,
            age_rating: self.age_rating,
        }
    }
}

/// Map gendered profession labels onto the stored profession names
pub fn normalize_profession(profession: &str) -> String {
    let lowered = profession.trim().to_lowercase();
    match lowered.as_str() {
        "актриса" => "актер".to_string(),
        "actress" => "actor".to_string(),
        _ => lowered,
    }
}

/// Typed record extracted from a person ("maker") detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPerson {
    pub external_id: i64,
    pub name: String,
    pub original_name: Option<String>,
    /// Raw `YYYY-MM-DD` string as published; may contain zero components
    pub birth_date: Option<String>,
    pub professions: Vec<String>,
}

/// Person ready to be created in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub external_id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub professions: Vec<String>,
}

/// Stored person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub external_id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Work columns ready to be created in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWork {
    pub external_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub country: Option<String>,
    pub trailer_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub age_rating: Option<i32>,
}

/// Stored work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    pub external_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub country: Option<String>,
    pub trailer_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub age_rating: Option<i32>,
}

impl Work {
    pub fn from_new(id: WorkId, work: &NewWork) -> Self {
        Self {
            id,
            external_id: work.external_id,
            title: work.title.clone(),
            original_title: work.original_title.clone(),
            poster_url: work.poster_url.clone(),
            synopsis: work.synopsis.clone(),
            country: work.country.clone(),
            trailer_url: work.trailer_url.clone(),
            release_date: work.release_date,
            rating: work.rating,
            duration_minutes: work.duration_minutes,
            age_rating: work.age_rating,
        }
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.release_date {
            Some(date) => write!(f, "{} ({date})", self.title),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Relation sets attached to a work at creation time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRelations {
    pub genres: Vec<GenreId>,
    pub actors: Vec<PersonId>,
    pub directors: Vec<PersonId>,
    pub dubbings: Vec<DubbingId>,
}
