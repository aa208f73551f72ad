//! Repository interfaces for the film catalog
//!
//! The store is an external collaborator: the harvester only needs lookups by
//! natural key, bulk creation, and creation of a work together with its
//! relation sets. Upsert semantics are driven entirely by the resolver.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::entities::{
    NewPerson, NewWork, Person, ReferenceEntry, ReferenceKind, Work, WorkRelations,
};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Persons (natural key: external id)
    async fn find_persons_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Person>>;
    async fn bulk_create_persons(&self, persons: &[NewPerson]) -> Result<Vec<Person>>;

    // Genre / dubbing / profession lookup tables (natural key: name)
    async fn find_reference_by_names(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>>;
    async fn bulk_create_reference(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>>;

    // Works (natural key: external id)
    async fn find_works_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Work>>;
    async fn create_work_with_relations(&self, work: &NewWork, relations: &WorkRelations) -> Result<Work>;

    // Snapshot reads used for gap detection
    async fn work_external_ids(&self) -> Result<Vec<i64>>;
    async fn boundary_work_external_id(&self, descending: bool) -> Result<Option<i64>>;
}
