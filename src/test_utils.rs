//! Test utilities for the harvester
//!
//! Provides in-memory and scripted stand-ins for the store and the source
//! ports, a fresh SQLite database per test, and a loopback HTTP responder
//! for exercising the real client without leaving the machine.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::application::error::{FetchError, ParsingError};
use crate::application::sources::{PersonSource, SourceError, WorkSource};
use crate::domain::entities::{
    NewPerson, NewWork, Person, PersonId, ReferenceEntry, ReferenceKind, ScrapedPerson, ScrapedWork, Work, WorkId,
    WorkRelations,
};
use crate::domain::repositories::CatalogStore;
use crate::infrastructure::{DatabaseConnection, SqliteCatalogStore};

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create a new in-memory test database with the catalog schema
    pub async fn new() -> Result<Self> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(Self { connection: db })
    }

    pub fn store(&self) -> SqliteCatalogStore {
        SqliteCatalogStore::new(self.connection.pool().clone())
    }
}

// ============================================================================
// In-memory catalog store
// ============================================================================

/// Store calls that tests assert ordering on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    WorkLookup(Vec<i64>),
    WorkCreated(i64),
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    persons: Vec<Person>,
    created_persons: Vec<NewPerson>,
    person_create_calls: usize,
    reference: HashMap<ReferenceKind, BTreeMap<String, i64>>,
    reference_create_calls: HashMap<ReferenceKind, usize>,
    works: Vec<(Work, WorkRelations)>,
    events: Vec<StoreEvent>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryCatalogStore {
    state: Mutex<MemoryState>,
    write_delay: Duration,
    fail_work_creates: bool,
    person_lookup_failures: AtomicUsize,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a lookup table
    #[must_use]
    pub fn with_reference(self, kind: ReferenceKind, names: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for name in names {
                let id = state.next_id();
                state.reference.entry(kind).or_default().insert((*name).to_string(), id);
            }
        }
        self
    }

    /// Sleep before every work creation
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    #[must_use]
    pub fn failing_work_creates(mut self) -> Self {
        self.fail_work_creates = true;
        self
    }

    /// Fail the next `times` person lookups
    #[must_use]
    pub fn failing_person_lookups(self, times: usize) -> Self {
        self.person_lookup_failures.store(times, Ordering::SeqCst);
        self
    }

    /// Store a bare work directly, bypassing the pipeline
    pub fn insert_work(&self, work: &ScrapedWork) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.works.push((Work::from_new(WorkId(id), &work.to_new_work()), WorkRelations::default()));
    }

    pub fn persons(&self) -> Vec<Person> {
        self.state.lock().unwrap().persons.clone()
    }

    /// Every person handed to a bulk create, in call order
    pub fn created_persons(&self) -> Vec<NewPerson> {
        self.state.lock().unwrap().created_persons.clone()
    }

    pub fn person_create_calls(&self) -> usize {
        self.state.lock().unwrap().person_create_calls
    }

    pub fn reference(&self, kind: ReferenceKind) -> HashMap<String, i64> {
        let state = self.state.lock().unwrap();
        state
            .reference
            .get(&kind)
            .map(|names| names.iter().map(|(name, id)| (name.clone(), *id)).collect())
            .unwrap_or_default()
    }

    pub fn reference_create_calls(&self, kind: ReferenceKind) -> usize {
        self.state.lock().unwrap().reference_create_calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn work_external_ids_now(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.lock().unwrap().works.iter().map(|(w, _)| w.external_id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn stored_work(&self, external_id: i64) -> Option<(Work, WorkRelations)> {
        self.state
            .lock()
            .unwrap()
            .works
            .iter()
            .find(|(w, _)| w.external_id == external_id)
            .cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_persons_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Person>> {
        if self
            .person_lookup_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("transient lookup failure"));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .persons
            .iter()
            .filter(|p| external_ids.contains(&p.external_id))
            .cloned()
            .collect())
    }

    async fn bulk_create_persons(&self, persons: &[NewPerson]) -> Result<Vec<Person>> {
        let mut state = self.state.lock().unwrap();
        state.person_create_calls += 1;
        if let Some(person) = persons
            .iter()
            .find(|n| state.persons.iter().any(|p| p.external_id == n.external_id))
        {
            return Err(anyhow!("UNIQUE constraint failed: persons.external_id ({})", person.external_id));
        }
        state.created_persons.extend(persons.iter().cloned());

        for person in persons {
            let id = state.next_id();
            state.persons.push(Person {
                id: PersonId(id),
                external_id: person.external_id,
                name: person.name.clone(),
                original_name: person.original_name.clone(),
                birth_date: person.birth_date,
            });
        }

        Ok(state
            .persons
            .iter()
            .filter(|p| persons.iter().any(|n| n.external_id == p.external_id))
            .cloned()
            .collect())
    }

    async fn find_reference_by_names(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>> {
        let state = self.state.lock().unwrap();
        let Some(table) = state.reference.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(table
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, id)| ReferenceEntry {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    async fn bulk_create_reference(&self, kind: ReferenceKind, names: &[String]) -> Result<Vec<ReferenceEntry>> {
        let mut state = self.state.lock().unwrap();
        *state.reference_create_calls.entry(kind).or_default() += 1;

        if let Some(name) = names
            .iter()
            .find(|name| state.reference.get(&kind).is_some_and(|t| t.contains_key(*name)))
        {
            return Err(anyhow!("UNIQUE constraint failed: {}.name ({})", kind.table(), name));
        }

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            let id = state.next_id();
            state.reference.entry(kind).or_default().insert(name.clone(), id);
            created.push(ReferenceEntry { id, name: name.clone() });
        }
        Ok(created)
    }

    async fn find_works_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Work>> {
        let mut state = self.state.lock().unwrap();
        state.events.push(StoreEvent::WorkLookup(external_ids.to_vec()));
        Ok(state
            .works
            .iter()
            .filter(|(w, _)| external_ids.contains(&w.external_id))
            .map(|(w, _)| w.clone())
            .collect())
    }

    async fn create_work_with_relations(&self, work: &NewWork, relations: &WorkRelations) -> Result<Work> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        if self.fail_work_creates {
            return Err(anyhow!("disk I/O error while creating work {}", work.external_id));
        }

        let mut state = self.state.lock().unwrap();
        if state.works.iter().any(|(w, _)| w.external_id == work.external_id) {
            return Err(anyhow!("UNIQUE constraint failed: works.external_id ({})", work.external_id));
        }
        let id = state.next_id();
        let stored = Work::from_new(WorkId(id), work);
        state.works.push((stored.clone(), relations.clone()));
        state.events.push(StoreEvent::WorkCreated(work.external_id));
        Ok(stored)
    }

    async fn work_external_ids(&self) -> Result<Vec<i64>> {
        Ok(self.work_external_ids_now())
    }

    async fn boundary_work_external_id(&self, descending: bool) -> Result<Option<i64>> {
        let ids = self.work_external_ids_now();
        Ok(if descending { ids.last().copied() } else { ids.first().copied() })
    }
}

// ============================================================================
// Scripted sources
// ============================================================================

/// Scripted answer to one work fetch
#[derive(Debug, Clone)]
pub enum WorkScript {
    Work(ScrapedWork),
    Status(u16),
    Exhausted,
    Unparseable,
}

/// Work source answering fetches from a queue, in request order
#[derive(Clone, Default)]
pub struct ScriptedWorkSource {
    scripts: Arc<Mutex<VecDeque<WorkScript>>>,
    requested: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedWorkSource {
    pub fn new(scripts: impl IntoIterator<Item = WorkScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            requested: Arc::default(),
        }
    }

    pub fn requested(&self) -> Vec<i64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkSource for ScriptedWorkSource {
    async fn fetch_work(&self, external_id: i64) -> Result<ScrapedWork, SourceError> {
        self.requested.lock().unwrap().push(external_id);
        let url = format!("scripted://work/{external_id}");
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            Some(WorkScript::Work(work)) => Ok(work),
            Some(WorkScript::Status(status)) => Err(FetchError::Status { url, status }.into()),
            Some(WorkScript::Exhausted) => Err(FetchError::RetriesExhausted {
                url,
                attempts: 10,
                last_error: "connection reset by peer".to_string(),
            }
            .into()),
            Some(WorkScript::Unparseable) => Err(ParsingError::required_field_missing("title", external_id).into()),
            None => Err(FetchError::Status { url, status: 404 }.into()),
        }
    }
}

/// Person source serving a fixed set of pages; unknown ids answer 404
#[derive(Clone, Default)]
pub struct ScriptedPersonSource {
    pages: Arc<HashMap<i64, ScrapedPerson>>,
    requested: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedPersonSource {
    pub fn new(pages: Vec<ScrapedPerson>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().map(|p| (p.external_id, p)).collect()),
            requested: Arc::default(),
        }
    }

    pub fn requested(&self) -> Vec<i64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersonSource for ScriptedPersonSource {
    async fn fetch_person(&self, external_id: i64) -> Result<ScrapedPerson, SourceError> {
        self.requested.lock().unwrap().push(external_id);
        self.pages.get(&external_id).cloned().ok_or_else(|| {
            FetchError::Status {
                url: format!("scripted://person/{external_id}"),
                status: 404,
            }
            .into()
        })
    }
}

// ============================================================================
// Loopback HTTP responder
// ============================================================================

/// Serves queued `(status, body)` responses, one per connection, and records
/// every raw request it received
pub struct LoopbackServer {
    addr: SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<String>>>,
    _task: JoinHandle<()>,
}

impl LoopbackServer {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        let task = tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                log.lock().await.push(request);

                let reason = if status == 200 { "OK" } else { "Scripted" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            requests,
            _task: task,
        }
    }

    /// A URL nothing listens on
    pub async fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        if let Some(header_end) = find_header_end(&buffer) {
            let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
