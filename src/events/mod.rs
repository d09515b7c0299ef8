pub mod error;
pub mod network;
pub mod tcp;
pub mod timestamp;

pub use error::EventError;
pub use network::{DnsEvent, IcmpEvent, UdpEvent};
pub use tcp::{TcpBeginEvent, TcpDataEvent, TcpEndEvent};
pub use timestamp::Timestamp;

use error::require;
use shared::EventRecord;
use std::fmt;

/// Event discriminant, resolved from the record's `event-type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Icmp,
    Udp,
    Dns,
    TcpBegin,
    TcpData,
    TcpEnd,
}

impl EventKind {
    /// `dns-query` and `dns-response` both map to [`EventKind::Dns`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "icmp" => Some(Self::Icmp),
            "udp" => Some(Self::Udp),
            "dns-query" | "dns-response" => Some(Self::Dns),
            "begin-tcp-connection" => Some(Self::TcpBegin),
            "tcp-data" => Some(Self::TcpData),
            "end-tcp-connection" => Some(Self::TcpEnd),
            _ => None,
        }
    }
}

pub fn classify(record: &EventRecord) -> Result<EventKind, EventError> {
    let tag = require(record.event_type.as_deref(), "event", "event-type")?;
    EventKind::from_tag(tag).ok_or_else(|| EventError::UnknownEventType(tag.to_string()))
}

/// Fields shared by every event variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseEvent {
    pub number: u64,
    pub timestamp: Timestamp,
    pub source_ip: String,
    pub destination_ip: String,
    pub source_hostname: Option<String>,
    pub destination_hostname: Option<String>,
}

impl BaseEvent {
    const REQUIRED: &'static [&'static str] =
        &["event-number", "date", "event-type", "source-ip", "destination-ip"];

    fn validate(record: &EventRecord, event_type: &'static str) -> Result<(), EventError> {
        if let Some(&field) = Self::REQUIRED.iter().find(|f| !record.has(f)) {
            return Err(EventError::MissingRequiredField { event_type, field });
        }

        match record.date.as_deref() {
            Some(date) if Timestamp::is_well_formed(date) => Ok(()),
            Some(date) => Err(EventError::InvalidTimestamp(date.to_string())),
            None => Err(EventError::MissingRequiredField {
                event_type,
                field: "date",
            }),
        }
    }

    fn from_record(record: &EventRecord, event_type: &'static str) -> Result<Self, EventError> {
        let date = require(record.date.as_deref(), event_type, "date")?;

        Ok(Self {
            number: require(record.event_number, event_type, "event-number")?,
            timestamp: Timestamp::parse(date)?,
            source_ip: require(record.source_ip.clone(), event_type, "source-ip")?,
            destination_ip: require(record.destination_ip.clone(), event_type, "destination-ip")?,
            source_hostname: record.source_hostname.clone(),
            destination_hostname: record.destination_hostname.clone(),
        })
    }

    fn fill_record(&self, record: &mut EventRecord, tag: &str) {
        record.event_number = Some(self.number);
        record.date = Some(self.timestamp.to_string());
        record.event_type = Some(tag.to_string());
        record.source_ip = Some(self.source_ip.clone());
        record.destination_ip = Some(self.destination_ip.clone());
        record.source_hostname = self.source_hostname.clone();
        record.destination_hostname = self.destination_hostname.clone();
    }
}

/// Validation and construction shared by all variants.
///
/// A record is validated in full before anything is built, so a variant is
/// never partially constructed.
pub trait EventVariant: Sized {
    const NAME: &'static str;
    const REQUIRED: &'static [&'static str];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError>;

    fn validate(record: &EventRecord) -> Result<(), EventError> {
        BaseEvent::validate(record, Self::NAME)?;
        match Self::REQUIRED.iter().find(|f| !record.has(f)) {
            Some(&field) => Err(EventError::MissingRequiredField {
                event_type: Self::NAME,
                field,
            }),
            None => Ok(()),
        }
    }

    fn is_valid(record: &EventRecord) -> bool {
        Self::validate(record).is_ok()
    }

    fn from_record(record: &EventRecord) -> Result<Self, EventError> {
        Self::validate(record)?;
        let base = BaseEvent::from_record(record, Self::NAME)?;
        Self::build(base, record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Icmp(IcmpEvent),
    Udp(UdpEvent),
    Dns(DnsEvent),
    TcpBegin(TcpBeginEvent),
    TcpData(TcpDataEvent),
    TcpEnd(TcpEndEvent),
}

impl Event {
    pub fn parse(record: &EventRecord) -> Result<Self, EventError> {
        match classify(record)? {
            EventKind::Icmp => IcmpEvent::from_record(record).map(Self::Icmp),
            EventKind::Udp => UdpEvent::from_record(record).map(Self::Udp),
            EventKind::Dns => DnsEvent::from_record(record).map(Self::Dns),
            EventKind::TcpBegin => TcpBeginEvent::from_record(record).map(Self::TcpBegin),
            EventKind::TcpData => TcpDataEvent::from_record(record).map(Self::TcpData),
            EventKind::TcpEnd => TcpEndEvent::from_record(record).map(Self::TcpEnd),
        }
    }

    /// Parses a loosely-typed JSON value, e.g. one element of an event array.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EventError> {
        let record: EventRecord = serde_json::from_value(value)?;
        Self::parse(&record)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Icmp(_) => EventKind::Icmp,
            Self::Udp(_) => EventKind::Udp,
            Self::Dns(_) => EventKind::Dns,
            Self::TcpBegin(_) => EventKind::TcpBegin,
            Self::TcpData(_) => EventKind::TcpData,
            Self::TcpEnd(_) => EventKind::TcpEnd,
        }
    }

    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::Icmp(ev) => &ev.base,
            Self::Udp(ev) => &ev.base,
            Self::Dns(ev) => &ev.base,
            Self::TcpBegin(ev) => &ev.base,
            Self::TcpData(ev) => &ev.base,
            Self::TcpEnd(ev) => &ev.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseEvent {
        match self {
            Self::Icmp(ev) => &mut ev.base,
            Self::Udp(ev) => &mut ev.base,
            Self::Dns(ev) => &mut ev.base,
            Self::TcpBegin(ev) => &mut ev.base,
            Self::TcpData(ev) => &mut ev.base,
            Self::TcpEnd(ev) => &mut ev.base,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.base().timestamp
    }

    /// Source and destination ports, for the variants that carry them.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match self {
            Self::Icmp(_) => None,
            Self::Udp(ev) => Some((ev.source_port, ev.destination_port)),
            Self::Dns(ev) => Some((ev.source_port, ev.destination_port)),
            Self::TcpBegin(ev) => Some((ev.source_port, ev.destination_port)),
            Self::TcpData(ev) => Some((ev.source_port, ev.destination_port)),
            Self::TcpEnd(ev) => Some((ev.source_port, ev.destination_port)),
        }
    }

    /// The record tag this event is written back with.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Icmp(_) => "icmp",
            Self::Udp(_) => "udp",
            Self::Dns(ev) if ev.is_query() => "dns-query",
            Self::Dns(_) => "dns-response",
            Self::TcpBegin(_) => "begin-tcp-connection",
            Self::TcpData(_) => "tcp-data",
            Self::TcpEnd(_) => "end-tcp-connection",
        }
    }

    pub fn to_record(&self) -> EventRecord {
        let mut record = EventRecord::default();
        self.base().fill_record(&mut record, self.tag());

        match self {
            Self::Icmp(ev) => ev.fill_record(&mut record),
            Self::Udp(ev) => ev.fill_record(&mut record),
            Self::Dns(ev) => ev.fill_record(&mut record),
            Self::TcpBegin(ev) => ev.fill_record(&mut record),
            Self::TcpData(ev) => ev.fill_record(&mut record),
            Self::TcpEnd(ev) => ev.fill_record(&mut record),
        }

        record
    }
}

fn write_endpoint(
    f: &mut fmt::Formatter<'_>,
    addr: &str,
    port: Option<u16>,
    host: Option<&str>,
) -> fmt::Result {
    if addr.contains(':') {
        write!(f, "[{addr}]")?;
    } else {
        write!(f, "{addr}")?;
    }
    if let Some(port) = port {
        write!(f, ":{port}")?;
    }
    if let Some(host) = host {
        write!(f, " ({host})")?;
    }
    Ok(())
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.base();
        let (sport, dport) = match self.ports() {
            Some((s, d)) => (Some(s), Some(d)),
            None => (None, None),
        };

        write!(f, "[{}] ", base.timestamp)?;
        write_endpoint(f, &base.source_ip, sport, base.source_hostname.as_deref())?;
        write!(f, " -> ")?;
        write_endpoint(f, &base.destination_ip, dport, base.destination_hostname.as_deref())?;
        write!(f, " ")?;

        match self {
            Self::Icmp(ev) => write!(
                f,
                "[ICMP] Type: {}, code: {}, transferred: {}",
                ev.icmp_type, ev.icmp_code, ev.transferred
            ),
            Self::Udp(ev) => write!(f, "[UDP] Transferred: {}", ev.transferred),
            Self::Dns(ev) => {
                write!(
                    f,
                    "[DNS {}] Query type: {}, domain: '{}', transferred: {}",
                    if ev.is_query() { "query" } else { "response" },
                    ev.query_type,
                    ev.domain,
                    ev.transferred
                )?;
                if let Some(responses) = &ev.responses {
                    write!(f, ", responses: {}", responses.join(", "))?;
                }
                Ok(())
            }
            Self::TcpBegin(_) => write!(f, "[Begin TCP connection]"),
            Self::TcpData(ev) => write!(f, "[TCP data] Payload: {}", ev.payload),
            Self::TcpEnd(ev) => write!(
                f,
                "[End TCP connection] Creation: {}, transferred client: {}, transferred server: {}",
                ev.creation, ev.transferred_client, ev.transferred_server
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn record(value: serde_json::Value) -> EventRecord {
        serde_json::from_value(value).unwrap()
    }

    fn tcp_data_record() -> serde_json::Value {
        json!({
            "event-number": 3,
            "date": "2022/05/01 10:00:00.000250",
            "event-type": "tcp-data",
            "source-ip": "192.168.1.10",
            "destination-ip": "93.184.216.34",
            "destination-hostname": "example.com",
            "source-port": 51000,
            "destination-port": 80,
            "payload": 512
        })
    }

    #[test]
    fn classifies_every_known_tag() {
        let cases = [
            ("icmp", EventKind::Icmp),
            ("udp", EventKind::Udp),
            ("dns-query", EventKind::Dns),
            ("dns-response", EventKind::Dns),
            ("begin-tcp-connection", EventKind::TcpBegin),
            ("tcp-data", EventKind::TcpData),
            ("end-tcp-connection", EventKind::TcpEnd),
        ];
        for (tag, kind) in cases {
            let rec = record(json!({ "event-type": tag }));
            assert_eq!(classify(&rec).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_tag_is_reported_as_such() {
        let rec = record(json!({ "event-type": "arp" }));
        assert!(matches!(classify(&rec), Err(EventError::UnknownEventType(t)) if t == "arp"));

        let rec = record(json!({ "event-number": 1 }));
        assert!(matches!(
            classify(&rec),
            Err(EventError::MissingRequiredField { field: "event-type", .. })
        ));
    }

    #[test]
    fn parses_tcp_data_event() {
        let ev = Event::parse(&record(tcp_data_record())).unwrap();
        assert_eq!(ev.kind(), EventKind::TcpData);
        assert_eq!(ev.ports(), Some((51000, 80)));

        let base = ev.base();
        assert_eq!(base.number, 3);
        assert_eq!(base.timestamp.to_string(), "2022/05/01 10:00:00.000250");
        assert_eq!(base.source_hostname, None);
        assert_eq!(base.destination_hostname.as_deref(), Some("example.com"));

        match ev {
            Event::TcpData(data) => assert_eq!(data.payload, 512),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn missing_common_field_fails_validation() {
        let mut value = tcp_data_record();
        value.as_object_mut().unwrap().remove("source-ip");

        let rec = record(value);
        assert!(!TcpDataEvent::is_valid(&rec));
        assert!(matches!(
            Event::parse(&rec),
            Err(EventError::MissingRequiredField {
                event_type: "tcp-data",
                field: "source-ip"
            })
        ));
    }

    #[test]
    fn malformed_date_is_invalid_timestamp() {
        let mut value = tcp_data_record();
        value["date"] = json!("2022-05-01 10:00:00");
        assert!(matches!(
            Event::parse(&record(value)),
            Err(EventError::InvalidTimestamp(_))
        ));

        let mut value = tcp_data_record();
        value["date"] = json!("2022/02/31 10:00:00.000000");
        assert!(TcpDataEvent::is_valid(&record(value.clone())));
        assert!(matches!(
            Event::parse(&record(value)),
            Err(EventError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn wrongly_typed_field_is_malformed() {
        let mut value = tcp_data_record();
        value["payload"] = json!("lots");
        assert!(matches!(
            Event::from_value(value),
            Err(EventError::MalformedRecord(_))
        ));
    }

    #[test]
    fn record_round_trips_through_event() {
        let rec = record(tcp_data_record());
        let ev = Event::parse(&rec).unwrap();
        assert_eq!(ev.to_record(), rec);
    }

    #[test]
    fn displays_human_readable_line() {
        let ev = Event::parse(&record(tcp_data_record())).unwrap();
        assert_eq!(
            ev.to_string(),
            "[2022/05/01 10:00:00.000250] 192.168.1.10:51000 -> \
             93.184.216.34:80 (example.com) [TCP data] Payload: 512"
        );
    }
}
