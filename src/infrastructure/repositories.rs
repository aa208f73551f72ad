//! Repository implementations for the film catalog
//!
//! Contains the SQLite implementation of the catalog store port.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;

use crate::domain::entities::{
    NewPerson, NewWork, Person, PersonId, ReferenceEntry, ReferenceKind, Work, WorkId, WorkRelations,
};
use crate::domain::repositories::CatalogStore;

/// Keys per `IN (...)` list, well below SQLite's bound parameter limit
const LOOKUP_CHUNK_SIZE: usize = 500;

const WORK_COLUMNS: &str = "id, external_id, title, original_title, poster_url, synopsis, country, \
     trailer_url, release_date, rating, duration_minutes, age_rating";

pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_person(row: &SqliteRow) -> Result<Person> {
        Ok(Person {
            id: PersonId(row.try_get("id")?),
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            original_name: row.try_get("original_name")?,
            birth_date: row.try_get("birth_date")?,
        })
    }

    fn row_to_work(row: &SqliteRow) -> Result<Work> {
        Ok(Work {
            id: WorkId(row.try_get("id")?),
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            original_title: row.try_get("original_title")?,
            poster_url: row.try_get("poster_url")?,
            synopsis: row.try_get("synopsis")?,
            country: row.try_get("country")?,
            trailer_url: row.try_get("trailer_url")?,
            release_date: row.try_get("release_date")?,
            rating: row.try_get("rating")?,
            duration_minutes: row.try_get("duration_minutes")?,
            age_rating: row.try_get("age_rating")?,
        })
    }

    fn row_to_reference(row: &SqliteRow) -> Result<ReferenceEntry> {
        Ok(ReferenceEntry {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }

    /// `SELECT <columns> FROM <table> WHERE <key> IN (...)`, chunked
    async fn select_in<K, T>(
        &self,
        columns: &str,
        table: &str,
        key: &str,
        keys: &[K],
        map_row: fn(&SqliteRow) -> Result<T>,
    ) -> Result<Vec<T>>
    where
        K: for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + Clone + Send + Sync + 'static,
    {
        let mut found = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE {key} IN ("));
            let mut separated = builder.separated(", ");
            for value in chunk {
                separated.push_bind(value.clone());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                found.push(map_row(row)?);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn find_persons_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Person>> {
        self.select_in(
            "id, external_id, name, original_name, birth_date",
            "persons",
            "external_id",
            external_ids,
            Self::row_to_person,
        )
        .await
    }

    async fn bulk_create_persons(&self, persons: &[NewPerson]) -> Result<Vec<Person>> {
        if persons.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        for person in persons {
            sqlx::query(
                "INSERT INTO persons (external_id, name, original_name, birth_date) VALUES (?, ?, ?, ?)",
            )
            .bind(person.external_id)
            .bind(&person.name)
            .bind(&person.original_name)
            .bind(person.birth_date)
            .execute(&mut *tx)
            .await?;

            // Professions are lookup-only: unknown names match no row
            let professions: BTreeSet<&String> = person.professions.iter().collect();
            for profession in professions {
                sqlx::query(
                    r"
                    INSERT INTO person_professions (person_id, profession_id)
                    SELECT p.id, pr.id FROM persons p, professions pr
                    WHERE p.external_id = ? AND pr.name = ?
                    ",
                )
                .bind(person.external_id)
                .bind(profession)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        let external_ids: Vec<i64> = persons.iter().map(|p| p.external_id).collect();
        self.find_persons_by_external_ids(&external_ids).await
    }

    async fn find_reference_by_names(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>> {
        self.select_in("id, name", kind.table(), "name", names, Self::row_to_reference)
            .await
    }

    async fn bulk_create_reference(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in names.chunks(LOOKUP_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {} (name) ", kind.table()));
            builder.push_values(chunk, |mut row, name| {
                row.push_bind(name.clone());
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        self.find_reference_by_names(kind, names).await
    }

    async fn find_works_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Work>> {
        self.select_in(WORK_COLUMNS, "works", "external_id", external_ids, Self::row_to_work)
            .await
    }

    async fn create_work_with_relations(&self, work: &NewWork, relations: &WorkRelations) -> Result<Work> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO works (external_id, title, original_title, poster_url, synopsis, country,
                               trailer_url, release_date, rating, duration_minutes, age_rating)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(work.external_id)
        .bind(&work.title)
        .bind(&work.original_title)
        .bind(&work.poster_url)
        .bind(&work.synopsis)
        .bind(&work.country)
        .bind(&work.trailer_url)
        .bind(work.release_date)
        .bind(work.rating)
        .bind(work.duration_minutes)
        .bind(work.age_rating)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| anyhow!("Failed to insert work {}: {}", work.external_id, e))?;

        let links: [(&str, &str, Vec<i64>); 4] = [
            ("work_genres", "genre_id", relations.genres.iter().map(|g| g.0).collect()),
            ("work_dubbings", "dubbing_id", relations.dubbings.iter().map(|d| d.0).collect()),
            ("work_actors", "person_id", relations.actors.iter().map(|p| p.0).collect()),
            ("work_directors", "person_id", relations.directors.iter().map(|p| p.0).collect()),
        ];
        for (table, column, ids) in links {
            if ids.is_empty() {
                continue;
            }
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {table} (work_id, {column}) "));
            builder.push_values(ids, |mut row, related_id| {
                row.push_bind(id).push_bind(related_id);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(Work::from_new(WorkId(id), work))
    }

    async fn work_external_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT external_id FROM works ORDER BY external_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn boundary_work_external_id(&self, descending: bool) -> Result<Option<i64>> {
        let sql = if descending {
            "SELECT MAX(external_id) FROM works"
        } else {
            "SELECT MIN(external_id) FROM works"
        };
        let id: Option<i64> = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(id)
    }
}
