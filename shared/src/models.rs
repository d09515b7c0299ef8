use serde::{Deserialize, Serialize};

/// One raw event record as written by the capture side.
///
/// Every field is optional: the record is loosely typed and the per-variant
/// validators in `netmon::events` decide which fields must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp_code: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred_client: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred_server: Option<u64>,
}

impl EventRecord {
    /// Whether the field with the given wire name is present.
    pub fn has(&self, field: &str) -> bool {
        match field {
            "event-number" => self.event_number.is_some(),
            "date" => self.date.is_some(),
            "event-type" => self.event_type.is_some(),
            "source-ip" => self.source_ip.is_some(),
            "destination-ip" => self.destination_ip.is_some(),
            "source-hostname" => self.source_hostname.is_some(),
            "destination-hostname" => self.destination_hostname.is_some(),
            "icmp-type" => self.icmp_type.is_some(),
            "icmp-code" => self.icmp_code.is_some(),
            "transferred" => self.transferred.is_some(),
            "source-port" => self.source_port.is_some(),
            "destination-port" => self.destination_port.is_some(),
            "query-type" => self.query_type.is_some(),
            "domain" => self.domain.is_some(),
            "responses" => self.responses.is_some(),
            "payload" => self.payload.is_some(),
            "creation" => self.creation.is_some(),
            "transferred-client" => self.transferred_client.is_some(),
            "transferred-server" => self.transferred_server.is_some(),
            _ => false,
        }
    }
}

/// One row of the connection table handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionSummary {
    pub begin: String,
    pub end: Option<String>,
    pub time_last_packet: String,
    pub client_ip: String,
    pub client_hostname: Option<String>,
    pub client_port: u16,
    pub server_ip: String,
    pub server_hostname: Option<String>,
    pub server_port: u16,
    pub client_payload: u64,
    pub server_payload: u64,
    pub transferred_client: u64,
    pub transferred_server: u64,
    pub payload_events: usize,
}

/// One row of the per-connection payload timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadRow {
    pub timestamp: String,
    pub direction: String,
    pub payload: u64,
}

/// The derived address/host sets, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexSets {
    pub dns_clients: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub hostnames: Vec<String>,
    pub http_servers: Vec<String>,
    pub https_servers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_kebab_case_field_names() {
        let record: EventRecord = serde_json::from_str(
            r#"{"event-number": 7, "event-type": "tcp-data", "source-port": 443, "payload": 12}"#,
        )
        .unwrap();

        assert_eq!(record.event_number, Some(7));
        assert_eq!(record.event_type.as_deref(), Some("tcp-data"));
        assert!(record.has("source-port"));
        assert!(record.has("payload"));
        assert!(!record.has("destination-port"));
        assert!(!record.has("no-such-field"));
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let record = EventRecord {
            event_number: Some(1),
            domain: Some("example.com".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"event-number":1,"domain":"example.com"}"#);
    }
}
