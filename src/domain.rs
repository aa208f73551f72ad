//! Domain module - catalog entities and the store port
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod entities;
pub mod repositories;

pub use entities::{
    DubbingId, GenreId, NewPerson, NewWork, Person, PersonId, PersonRef,
    ReferenceEntry, ReferenceKind, ScrapedPerson, ScrapedWork, Work, WorkId, WorkRelations, normalize_profession,
};
pub use repositories::CatalogStore;
