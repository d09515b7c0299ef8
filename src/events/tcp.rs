use super::error::{require, EventError};
use super::timestamp::Timestamp;
use super::{BaseEvent, EventVariant};
use shared::EventRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpBeginEvent {
    pub base: BaseEvent,
    pub source_port: u16,
    pub destination_port: u16,
}

impl EventVariant for TcpBeginEvent {
    const NAME: &'static str = "begin-tcp-connection";
    const REQUIRED: &'static [&'static str] = &["source-port", "destination-port"];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        Ok(Self {
            base,
            source_port: require(record.source_port, Self::NAME, "source-port")?,
            destination_port: require(record.destination_port, Self::NAME, "destination-port")?,
        })
    }
}

impl TcpBeginEvent {
    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.source_port = Some(self.source_port);
        record.destination_port = Some(self.destination_port);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpDataEvent {
    pub base: BaseEvent,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: u64,
}

impl EventVariant for TcpDataEvent {
    const NAME: &'static str = "tcp-data";
    const REQUIRED: &'static [&'static str] = &["source-port", "destination-port", "payload"];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        Ok(Self {
            base,
            source_port: require(record.source_port, Self::NAME, "source-port")?,
            destination_port: require(record.destination_port, Self::NAME, "destination-port")?,
            payload: require(record.payload, Self::NAME, "payload")?,
        })
    }
}

impl TcpDataEvent {
    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.source_port = Some(self.source_port);
        record.destination_port = Some(self.destination_port);
        record.payload = Some(self.payload);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEndEvent {
    pub base: BaseEvent,
    pub source_port: u16,
    pub destination_port: u16,
    /// When the connection was created, as seen by the capture side.
    pub creation: Timestamp,
    pub transferred_client: u64,
    pub transferred_server: u64,
}

impl EventVariant for TcpEndEvent {
    const NAME: &'static str = "end-tcp-connection";
    const REQUIRED: &'static [&'static str] = &[
        "source-port",
        "destination-port",
        "creation",
        "transferred-client",
        "transferred-server",
    ];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        let creation = require(record.creation.as_deref(), Self::NAME, "creation")?;

        Ok(Self {
            base,
            source_port: require(record.source_port, Self::NAME, "source-port")?,
            destination_port: require(record.destination_port, Self::NAME, "destination-port")?,
            creation: Timestamp::parse(creation)?,
            transferred_client: require(record.transferred_client, Self::NAME, "transferred-client")?,
            transferred_server: require(record.transferred_server, Self::NAME, "transferred-server")?,
        })
    }
}

impl TcpEndEvent {
    /// Connection lifetime in microseconds, from creation to this event.
    pub fn duration_micros(&self) -> i64 {
        self.base.timestamp.micros_since(&self.creation)
    }

    pub fn transferred(&self) -> u64 {
        self.transferred_client.saturating_add(self.transferred_server)
    }

    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.source_port = Some(self.source_port);
        record.destination_port = Some(self.destination_port);
        record.creation = Some(self.creation.to_string());
        record.transferred_client = Some(self.transferred_client);
        record.transferred_server = Some(self.transferred_server);
    }
}
