//! Entity resolution against the catalog store
//!
//! Maps scraped references (person credits, genre and dubbing names) to
//! canonical store identifiers. Natural keys are deduplicated before the
//! store is queried, existing rows are reused and only the complement is
//! created, in one bulk call.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::application::sources::PersonSource;
use crate::domain::entities::{
    DubbingId, GenreId, NewPerson, PersonId, PersonRef, ReferenceKind, ScrapedPerson, normalize_profession,
};
use crate::domain::repositories::CatalogStore;

/// Outcome of the read-only half of person resolution
#[derive(Debug, Clone, Default)]
pub struct PersonPlan {
    /// Persons already in the store, by external id
    pub existing: HashMap<i64, PersonId>,
    /// Persons to create, in first-seen order
    pub to_create: Vec<NewPerson>,
}

impl PersonPlan {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty()
    }
}

pub struct EntityResolver<S: CatalogStore + ?Sized> {
    store: Arc<S>,
    persons: Arc<dyn PersonSource>,
    person_request_delay: Duration,
}

impl<S: CatalogStore + ?Sized> Clone for EntityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            persons: Arc::clone(&self.persons),
            person_request_delay: self.person_request_delay,
        }
    }
}

impl<S: CatalogStore + ?Sized> EntityResolver<S> {
    pub fn new(store: Arc<S>, persons: Arc<dyn PersonSource>, person_request_delay: Duration) -> Self {
        Self {
            store,
            persons,
            person_request_delay,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Store reads and person page fetches; nothing is written
    pub async fn plan_persons(&self, refs: &[PersonRef]) -> Result<PersonPlan> {
        let refs = unique_by(refs, |r| r.external_id);
        if refs.is_empty() {
            return Ok(PersonPlan::default());
        }

        let external_ids: Vec<i64> = refs.iter().map(|r| r.external_id).collect();
        let existing: HashMap<i64, PersonId> = self
            .store
            .find_persons_by_external_ids(&external_ids)
            .await?
            .into_iter()
            .map(|p| (p.external_id, p.id))
            .collect();

        let missing: Vec<&PersonRef> = refs
            .into_iter()
            .filter(|r| !existing.contains_key(&r.external_id))
            .collect();
        if missing.is_empty() {
            return Ok(PersonPlan {
                existing,
                to_create: Vec::new(),
            });
        }

        debug!("{} of {} persons are new, fetching their pages", missing.len(), external_ids.len());
        let mut to_create = Vec::with_capacity(missing.len());
        for (index, person_ref) in missing.into_iter().enumerate() {
            if index > 0 && !self.person_request_delay.is_zero() {
                sleep(self.person_request_delay).await;
            }
            to_create.push(self.build_person(person_ref).await);
        }

        Ok(PersonPlan { existing, to_create })
    }

    /// Create the planned persons in one bulk call and return the full mapping
    pub async fn commit_persons(&self, plan: PersonPlan) -> Result<HashMap<i64, PersonId>> {
        let PersonPlan { mut existing, to_create } = plan;
        if to_create.is_empty() {
            return Ok(existing);
        }

        let created = self.store.bulk_create_persons(&to_create).await?;
        info!("👤 Created {} persons", created.len());
        existing.extend(created.into_iter().map(|p| (p.external_id, p.id)));
        Ok(existing)
    }

    /// External id → person id for every credit in `refs`
    pub async fn resolve_persons_map(&self, refs: &[PersonRef]) -> Result<HashMap<i64, PersonId>> {
        let plan = self.plan_persons(refs).await?;
        self.commit_persons(plan).await
    }

    /// Person ids for `refs`, one per distinct external id, in first-seen order
    pub async fn resolve_persons(&self, refs: &[PersonRef]) -> Result<Vec<PersonId>> {
        let mapping = self.resolve_persons_map(refs).await?;
        Ok(unique_by(refs, |r| r.external_id)
            .into_iter()
            .filter_map(|r| mapping.get(&r.external_id).copied())
            .collect())
    }

    /// Genres are lookup-only; unknown names are left out
    pub async fn resolve_genres_map(&self, names: &[String]) -> Result<HashMap<String, GenreId>> {
        let names = unique_names(names);
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let found: HashMap<String, GenreId> = self
            .store
            .find_reference_by_names(ReferenceKind::Genre, &names)
            .await?
            .into_iter()
            .map(|entry| (entry.name, GenreId(entry.id)))
            .collect();

        if found.len() < names.len() {
            let unknown: Vec<&String> = names.iter().filter(|n| !found.contains_key(*n)).collect();
            warn!("Skipping unknown genres: {:?}", unknown);
        }
        Ok(found)
    }

    pub async fn resolve_genres(&self, names: &[String]) -> Result<Vec<GenreId>> {
        let mapping = self.resolve_genres_map(names).await?;
        Ok(ordered_ids(names, &mapping))
    }

    /// Dubbings are created on first sight
    pub async fn resolve_dubbings_map(&self, names: &[String]) -> Result<HashMap<String, DubbingId>> {
        let names = unique_names(names);
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let mut found: HashMap<String, DubbingId> = self
            .store
            .find_reference_by_names(ReferenceKind::Dubbing, &names)
            .await?
            .into_iter()
            .map(|entry| (entry.name, DubbingId(entry.id)))
            .collect();
        if found.len() == names.len() {
            return Ok(found);
        }

        let missing: Vec<String> = names.into_iter().filter(|n| !found.contains_key(n)).collect();
        debug!("Creating {} dubbings", missing.len());
        let created = self.store.bulk_create_reference(ReferenceKind::Dubbing, &missing).await?;
        found.extend(created.into_iter().map(|entry| (entry.name, DubbingId(entry.id))));
        Ok(found)
    }

    pub async fn resolve_dubbings(&self, names: &[String]) -> Result<Vec<DubbingId>> {
        let mapping = self.resolve_dubbings_map(names).await?;
        Ok(ordered_ids(names, &mapping))
    }

    /// Person from its detail page, or from the credit when the page is unavailable
    async fn build_person(&self, person_ref: &PersonRef) -> NewPerson {
        match self.persons.fetch_person(person_ref.external_id).await {
            Ok(scraped) => new_person_from_page(scraped),
            Err(e) => {
                warn!(
                    "Person page {} unavailable ({}), creating from credit '{}'",
                    person_ref.external_id, e, person_ref.name
                );
                new_person_from_ref(person_ref)
            }
        }
    }
}

fn new_person_from_page(scraped: ScrapedPerson) -> NewPerson {
    let birth_date = scraped.birth_date.as_deref().and_then(|raw| {
        let date = sanitize_birth_date(raw);
        if date.is_none() {
            warn!("Dropping unusable birth date '{}' of person {}", raw, scraped.external_id);
        }
        date
    });

    NewPerson {
        external_id: scraped.external_id,
        name: scraped.name,
        original_name: scraped.original_name,
        birth_date,
        professions: scraped.professions,
    }
}

fn new_person_from_ref(person_ref: &PersonRef) -> NewPerson {
    let profession = normalize_profession(&person_ref.profession);
    NewPerson {
        external_id: person_ref.external_id,
        name: person_ref.name.clone(),
        original_name: None,
        birth_date: None,
        professions: if profession.is_empty() { Vec::new() } else { vec![profession] },
    }
}

/// Replace zero components of a `YYYY-MM-DD` date with `1`, keeping their width
pub fn sanitize_date_components(raw: &str) -> String {
    raw.trim()
        .split('-')
        .map(|component| {
            if !component.is_empty() && component.bytes().all(|b| b == b'0') {
                format!("{:0>width$}", 1, width = component.len())
            } else {
                component.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Sanitized birth date, `None` when it is still not a calendar date
pub fn sanitize_birth_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&sanitize_date_components(raw), "%Y-%m-%d").ok()
}

fn unique_by<T, K, F>(items: &[T], key: F) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.iter().filter(|item| seen.insert(key(item))).collect()
}

fn unique_names(names: &[String]) -> Vec<String> {
    unique_by(names, Clone::clone).into_iter().cloned().collect()
}

fn ordered_ids<I: Copy>(names: &[String], mapping: &HashMap<String, I>) -> Vec<I> {
    unique_by(names, Clone::clone)
        .into_iter()
        .filter_map(|name| mapping.get(name).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryCatalogStore, ScriptedPersonSource};
    use proptest::prelude::*;

    fn credit(external_id: i64, name: &str, profession: &str) -> PersonRef {
        PersonRef {
            external_id,
            name: name.to_string(),
            profession: profession.to_string(),
        }
    }

    fn person_page(external_id: i64, name: &str, birth_date: Option<&str>) -> ScrapedPerson {
        ScrapedPerson {
            external_id,
            name: name.to_string(),
            original_name: None,
            birth_date: birth_date.map(str::to_string),
            professions: vec!["актер".to_string()],
        }
    }

    fn resolver(store: &Arc<MemoryCatalogStore>, persons: ScriptedPersonSource) -> EntityResolver<MemoryCatalogStore> {
        EntityResolver::new(Arc::clone(store), Arc::new(persons), Duration::ZERO)
    }

    #[tokio::test]
    async fn person_resolution_is_idempotent() {
        let store = Arc::new(MemoryCatalogStore::new());
        let persons = ScriptedPersonSource::new(vec![
            person_page(1, "Первый", Some("1970-01-02")),
            person_page(2, "Второй", None),
        ]);
        let resolver = resolver(&store, persons);
        let refs = vec![credit(1, "Первый", "актер"), credit(2, "Второй", "режиссер")];

        let first = resolver.resolve_persons(&refs).await.unwrap();
        assert_eq!(store.person_create_calls(), 1);

        let second = resolver.resolve_persons(&refs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.person_create_calls(), 1);
        assert_eq!(store.persons().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_credits_create_one_person() {
        let store = Arc::new(MemoryCatalogStore::new());
        let persons = ScriptedPersonSource::new(vec![person_page(5, "Дубль", None)]);
        let resolver = resolver(&store, persons.clone());
        let refs = vec![credit(5, "Дубль", "актер"), credit(5, "Дубль", "режиссер")];

        let ids = resolver.resolve_persons(&refs).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.persons().len(), 1);
        assert_eq!(persons.requested(), vec![5]);
    }

    #[tokio::test]
    async fn only_missing_persons_are_fetched_and_created() {
        let store = Arc::new(MemoryCatalogStore::new());
        let persons = ScriptedPersonSource::new(vec![person_page(1, "A", None), person_page(2, "B", None)]);
        let resolver = resolver(&store, persons.clone());

        resolver.resolve_persons(&[credit(1, "A", "актер")]).await.unwrap();
        let plan = resolver
            .plan_persons(&[credit(1, "A", "актер"), credit(2, "B", "актер")])
            .await
            .unwrap();

        assert_eq!(plan.existing.len(), 1);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].external_id, 2);
        assert_eq!(persons.requested(), vec![1, 2]);
        // Planning never writes
        assert_eq!(store.persons().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_person_page_falls_back_to_credit() {
        let store = Arc::new(MemoryCatalogStore::new());
        let resolver = resolver(&store, ScriptedPersonSource::new(Vec::new()));

        resolver.resolve_persons(&[credit(9, "Только в титрах", "актриса")]).await.unwrap();

        let created = store.created_persons();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Только в титрах");
        assert_eq!(created[0].birth_date, None);
        assert_eq!(created[0].professions, vec!["актер"]);
    }

    #[tokio::test]
    async fn birth_dates_are_sanitized_on_creation() {
        let store = Arc::new(MemoryCatalogStore::new());
        let persons = ScriptedPersonSource::new(vec![
            person_page(1, "A", Some("2000-00-15")),
            person_page(2, "B", Some("0000-05-00")),
            person_page(3, "C", Some("2001-02-30")),
        ]);
        let resolver = resolver(&store, persons);
        let refs = vec![credit(1, "A", "актер"), credit(2, "B", "актер"), credit(3, "C", "актер")];

        resolver.resolve_persons(&refs).await.unwrap();

        let dates: HashMap<i64, Option<NaiveDate>> =
            store.created_persons().into_iter().map(|p| (p.external_id, p.birth_date)).collect();
        assert_eq!(dates[&1], NaiveDate::from_ymd_opt(2000, 1, 15));
        assert_eq!(dates[&2], NaiveDate::from_ymd_opt(1, 5, 1));
        assert_eq!(dates[&3], None);
    }

    #[tokio::test]
    async fn genres_are_lookup_only() {
        let store = Arc::new(MemoryCatalogStore::new().with_reference(ReferenceKind::Genre, &["Драмы", "Комедии"]));
        let resolver = resolver(&store, ScriptedPersonSource::new(Vec::new()));
        let names = vec!["Комедии".to_string(), "Неведомое".to_string(), "Драмы".to_string(), "Комедии".to_string()];

        let ids = resolver.resolve_genres(&names).await.unwrap();

        let known = store.reference(ReferenceKind::Genre);
        assert_eq!(known.len(), 2);
        assert_eq!(ids, vec![GenreId(known["Комедии"]), GenreId(known["Драмы"])]);
    }

    #[tokio::test]
    async fn dubbing_resolution_creates_missing_names_once() {
        let store = Arc::new(MemoryCatalogStore::new().with_reference(ReferenceKind::Dubbing, &["Дубляж"]));
        let resolver = resolver(&store, ScriptedPersonSource::new(Vec::new()));
        let names = vec!["Дубляж".to_string(), "LostFilm".to_string(), "LostFilm".to_string()];

        let first = resolver.resolve_dubbings(&names).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(store.reference_create_calls(ReferenceKind::Dubbing), 1);

        let second = resolver.resolve_dubbings(&names).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.reference_create_calls(ReferenceKind::Dubbing), 1);
        assert_eq!(store.reference(ReferenceKind::Dubbing).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn person_fetches_are_paced() {
        let store = Arc::new(MemoryCatalogStore::new());
        let persons = ScriptedPersonSource::new(vec![
            person_page(1, "A", None),
            person_page(2, "B", None),
            person_page(3, "C", None),
        ]);
        let resolver = EntityResolver::new(Arc::clone(&store), Arc::new(persons), Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        resolver
            .resolve_persons(&[credit(1, "A", "актер"), credit(2, "B", "актер"), credit(3, "C", "актер")])
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn sanitizer_examples() {
        assert_eq!(sanitize_date_components("2000-00-15"), "2000-01-15");
        assert_eq!(sanitize_date_components("0000-05-00"), "0001-05-01");
        assert_eq!(sanitize_date_components("1999-12-31"), "1999-12-31");
        assert_eq!(sanitize_birth_date("not a date"), None);
    }

    proptest! {
        #[test]
        fn sanitized_dates_replace_only_zero_components(year in 0i32..=9999, month in 0u32..=12, day in 0u32..=28) {
            let raw = format!("{year:04}-{month:02}-{day:02}");
            let expected = NaiveDate::from_ymd_opt(year.max(1), month.max(1), day.max(1));
            prop_assert_eq!(sanitize_birth_date(&raw), expected);
        }

        #[test]
        fn sanitizer_keeps_component_widths(raw in "[0-9]{1,4}-[0-9]{1,2}-[0-9]{1,2}") {
            let sanitized = sanitize_date_components(&raw);
            let widths = |s: &str| s.split('-').map(str::len).collect::<Vec<_>>();
            prop_assert_eq!(widths(&sanitized), widths(&raw));
        }
    }
}
