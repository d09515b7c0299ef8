use super::connection_key::Endpoint;
use crate::events::{TcpBeginEvent, TcpDataEvent, TcpEndEvent, Timestamp};
use shared::{ConnectionSummary, PayloadRow};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "Client -> Server"),
            Direction::ServerToClient => write!(f, "Server -> Client"),
        }
    }
}

/// Per-direction `(micros since epoch, payload bytes)` points, sorted by time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSeries {
    pub client: Vec<(i64, u64)>,
    pub server: Vec<(i64, u64)>,
}

/// One reconstructed TCP session.
///
/// The client is whichever side sent the begin event. `end` stays `None`
/// for a connection that never saw its end event, including one superseded
/// by a later begin on the same endpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub client: Endpoint,
    pub client_hostname: Option<String>,
    pub server: Endpoint,
    pub server_hostname: Option<String>,
    pub begin: Timestamp,
    pub end: Option<Timestamp>,
    pub last_packet: Timestamp,
    pub client_payload: u64,
    pub server_payload: u64,
    pub transferred_client: u64,
    pub transferred_server: u64,
    pub payload_events: Vec<TcpDataEvent>,
}

impl Connection {
    pub fn open(event: &TcpBeginEvent) -> Self {
        let base = &event.base;
        Self {
            client: Endpoint::new(&base.source_ip, event.source_port),
            client_hostname: base.source_hostname.clone(),
            server: Endpoint::new(&base.destination_ip, event.destination_port),
            server_hostname: base.destination_hostname.clone(),
            begin: base.timestamp,
            end: None,
            last_packet: base.timestamp,
            client_payload: 0,
            server_payload: 0,
            transferred_client: 0,
            transferred_server: 0,
            payload_events: Vec::new(),
        }
    }

    pub fn direction_of(&self, event: &TcpDataEvent) -> Direction {
        if self.client.matches(&event.base.source_ip, event.source_port) {
            Direction::ClientToServer
        } else {
            Direction::ServerToClient
        }
    }

    pub(crate) fn record_data(&mut self, event: &TcpDataEvent) {
        match self.direction_of(event) {
            Direction::ClientToServer => {
                self.client_payload = self.client_payload.saturating_add(event.payload)
            }
            Direction::ServerToClient => {
                self.server_payload = self.server_payload.saturating_add(event.payload)
            }
        }
        self.last_packet = event.base.timestamp;
        self.payload_events.push(event.clone());
    }

    pub(crate) fn close(&mut self, event: &TcpEndEvent) {
        self.transferred_client = event.transferred_client;
        self.transferred_server = event.transferred_server;
        self.last_packet = event.base.timestamp;
        self.end = Some(event.base.timestamp);
    }

    pub fn is_terminated(&self) -> bool {
        self.end.is_some()
    }

    pub fn payload_rows(&self) -> Vec<PayloadRow> {
        self.payload_events
            .iter()
            .map(|ev| PayloadRow {
                timestamp: ev.base.timestamp.to_string(),
                direction: self.direction_of(ev).to_string(),
                payload: ev.payload,
            })
            .collect()
    }

    pub fn payload_series(&self) -> PayloadSeries {
        let mut series = PayloadSeries::default();
        for ev in &self.payload_events {
            let point = (ev.base.timestamp.as_micros(), ev.payload);
            match self.direction_of(ev) {
                Direction::ClientToServer => series.client.push(point),
                Direction::ServerToClient => series.server.push(point),
            }
        }
        series.client.sort_by_key(|&(t, _)| t);
        series.server.sort_by_key(|&(t, _)| t);
        series
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            begin: self.begin.to_string(),
            end: self.end.map(|t| t.to_string()),
            time_last_packet: self.last_packet.to_string(),
            client_ip: self.client.address.clone(),
            client_hostname: self.client_hostname.clone(),
            client_port: self.client.port,
            server_ip: self.server.address.clone(),
            server_hostname: self.server_hostname.clone(),
            server_port: self.server.port,
            client_payload: self.client_payload,
            server_payload: self.server_payload,
            transferred_client: self.transferred_client,
            transferred_server: self.transferred_server,
            payload_events: self.payload_events.len(),
        }
    }
}
