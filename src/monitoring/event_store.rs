use super::connection::Connection;
use super::reconstruction_engine;
use crate::events::{Event, EventError, EventKind};
use shared::{EventRecord, IndexSets};
use std::collections::HashSet;
use std::fs;
use std::hash::Hash;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid event file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Set with value-equality membership that iterates in insertion order.
#[derive(Debug, Clone)]
pub struct InsertionSet<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for InsertionSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

// Order matters for equality, so compare the insertion list only.
impl<T: Eq + Hash> PartialEq for InsertionSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Eq + Hash> Eq for InsertionSet<T> {}

impl<T: Eq + Hash + Clone> InsertionSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the value was already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.seen.contains(value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }
}

/// Ports whose begin events mark the destination as an HTTP/HTTPS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePorts {
    pub http: Vec<u16>,
    pub https: Vec<u16>,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            http: vec![80],
            https: vec![443],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventIndices {
    pub dns_clients: InsertionSet<String>,
    pub ip_addresses: InsertionSet<String>,
    pub hostnames: InsertionSet<String>,
    pub http_servers: InsertionSet<String>,
    pub https_servers: InsertionSet<String>,
}

impl EventIndices {
    fn observe(&mut self, event: &Event, ports: &ServicePorts) {
        let base = event.base();

        if let Event::Dns(dns) = event {
            if dns.is_query() {
                self.dns_clients.insert(base.source_ip.clone());
            }
        }

        self.ip_addresses.insert(base.source_ip.clone());
        self.ip_addresses.insert(base.destination_ip.clone());

        if let Some(host) = &base.source_hostname {
            self.hostnames.insert(host.clone());
        }
        if let Some(host) = &base.destination_hostname {
            self.hostnames.insert(host.clone());
        }

        if let Event::TcpBegin(begin) = event {
            let server = base
                .destination_hostname
                .clone()
                .unwrap_or_else(|| base.destination_ip.clone());

            if ports.http.contains(&begin.destination_port) {
                self.http_servers.insert(server);
            } else if ports.https.contains(&begin.destination_port) {
                self.https_servers.insert(server);
            }
        }
    }

    pub fn to_sets(&self) -> IndexSets {
        IndexSets {
            dns_clients: self.dns_clients.to_vec(),
            ip_addresses: self.ip_addresses.to_vec(),
            hostnames: self.hostnames.to_vec(),
            http_servers: self.http_servers.to_vec(),
            https_servers: self.https_servers.to_vec(),
        }
    }
}

/// Outcome of an ingestion pass. Unknown event types are counted apart from
/// records that failed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub parsed: usize,
    pub skipped: usize,
    pub unknown: usize,
}

/// Parsed event list plus the indices derived from it. Read-only once
/// loading is complete.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: Vec<Event>,
    indices: EventIndices,
    ports: ServicePorts,
    report: LoadReport,
}

impl EventStore {
    pub fn new(ports: ServicePorts) -> Self {
        Self {
            ports,
            ..Default::default()
        }
    }

    /// Builds a store from loosely-typed records with the default ports.
    pub fn load(records: impl IntoIterator<Item = serde_json::Value>) -> Self {
        let mut store = Self::new(ServicePorts::default());
        store.extend(records);
        store
    }

    /// Reads an event file: a JSON array of records or JSON Lines.
    pub fn open(path: impl AsRef<Path>, ports: ServicePorts) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut store = Self::new(ports);
        store.load_bytes(&bytes)?;
        log::info!(
            "Loaded {} events from {} ({} skipped, {} of unknown type)",
            store.report.parsed,
            path.display(),
            store.report.skipped,
            store.report.unknown
        );
        Ok(store)
    }

    pub fn load_text(&mut self, text: &str) -> Result<(), StoreError> {
        self.load_bytes(text.as_bytes())
    }

    /// Only a malformed JSON array fails as a whole; JSON Lines input is
    /// judged line by line, invalid UTF-8 included.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if bytes.trim_ascii_start().starts_with(b"[") {
            let records: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
            self.extend(records);
            return Ok(());
        }

        for (lineno, line) in bytes.split(|&b| b == b'\n').enumerate() {
            self.ingest_line(lineno + 1, line);
        }
        Ok(())
    }

    /// Ingests one JSON Lines record. Blank lines are ignored; lines that
    /// are not a JSON value count as skipped.
    pub fn ingest_line(&mut self, lineno: usize, line: &[u8]) -> Option<&Event> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice::<serde_json::Value>(line) {
            Ok(value) => self.ingest_value(value),
            Err(e) => {
                log::warn!("Skipping line {}: {}", lineno, e);
                self.report.skipped += 1;
                None
            }
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = serde_json::Value>) {
        for value in records {
            self.ingest_value(value);
        }
    }

    /// Ingests one raw record. Failures are logged and counted, never fatal;
    /// the parsed event is returned on success.
    pub fn ingest_value(&mut self, value: serde_json::Value) -> Option<&Event> {
        // unknown tags win over field type errors
        if let Some(tag) = value.get("event-type").and_then(serde_json::Value::as_str) {
            if EventKind::from_tag(tag).is_none() {
                return self.accept(Err(EventError::UnknownEventType(tag.to_string())));
            }
        }

        let result = serde_json::from_value::<EventRecord>(value)
            .map_err(EventError::from)
            .and_then(|record| Event::parse(&record));
        self.accept(result)
    }

    pub fn ingest(&mut self, record: &EventRecord) -> Option<&Event> {
        self.accept(Event::parse(record))
    }

    fn accept(&mut self, result: Result<Event, EventError>) -> Option<&Event> {
        match result {
            Ok(event) => {
                self.push(event);
                self.events.last()
            }
            Err(EventError::UnknownEventType(tag)) => {
                log::debug!("Ignoring event of unknown type '{}'", tag);
                self.report.unknown += 1;
                None
            }
            Err(e) => {
                log::warn!("Skipping event: {}", e);
                self.report.skipped += 1;
                None
            }
        }
    }

    pub fn push(&mut self, event: Event) {
        self.indices.observe(&event, &self.ports);
        self.events.push(event);
        self.report.parsed += 1;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn indices(&self) -> &EventIndices {
        &self.indices
    }

    pub fn report(&self) -> LoadReport {
        self.report
    }

    pub fn reconstruct(&self, focus: &str) -> Vec<Connection> {
        reconstruction_engine::reconstruct(&self.events, focus)
    }
}
