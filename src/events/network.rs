use super::error::{require, EventError};
use super::{BaseEvent, EventVariant};
use shared::EventRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpEvent {
    pub base: BaseEvent,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub transferred: u64,
}

impl EventVariant for IcmpEvent {
    const NAME: &'static str = "icmp";
    const REQUIRED: &'static [&'static str] = &["icmp-type", "icmp-code", "transferred"];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        Ok(Self {
            base,
            icmp_type: require(record.icmp_type, Self::NAME, "icmp-type")?,
            icmp_code: require(record.icmp_code, Self::NAME, "icmp-code")?,
            transferred: require(record.transferred, Self::NAME, "transferred")?,
        })
    }
}

impl IcmpEvent {
    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.icmp_type = Some(self.icmp_type);
        record.icmp_code = Some(self.icmp_code);
        record.transferred = Some(self.transferred);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEvent {
    pub base: BaseEvent,
    pub source_port: u16,
    pub destination_port: u16,
    pub transferred: u64,
}

impl EventVariant for UdpEvent {
    const NAME: &'static str = "udp";
    const REQUIRED: &'static [&'static str] = &["source-port", "destination-port", "transferred"];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        Ok(Self {
            base,
            source_port: require(record.source_port, Self::NAME, "source-port")?,
            destination_port: require(record.destination_port, Self::NAME, "destination-port")?,
            transferred: require(record.transferred, Self::NAME, "transferred")?,
        })
    }
}

impl UdpEvent {
    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.source_port = Some(self.source_port);
        record.destination_port = Some(self.destination_port);
        record.transferred = Some(self.transferred);
    }
}

/// DNS query or response. A response is recognised by its `responses` list;
/// the tag itself is not consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsEvent {
    pub base: BaseEvent,
    pub source_port: u16,
    pub destination_port: u16,
    pub transferred: u64,
    pub query_type: u16,
    pub domain: String,
    pub responses: Option<Vec<String>>,
}

impl EventVariant for DnsEvent {
    const NAME: &'static str = "dns";
    const REQUIRED: &'static [&'static str] = &[
        "source-port",
        "destination-port",
        "transferred",
        "query-type",
        "domain",
    ];

    fn build(base: BaseEvent, record: &EventRecord) -> Result<Self, EventError> {
        Ok(Self {
            base,
            source_port: require(record.source_port, Self::NAME, "source-port")?,
            destination_port: require(record.destination_port, Self::NAME, "destination-port")?,
            transferred: require(record.transferred, Self::NAME, "transferred")?,
            query_type: require(record.query_type, Self::NAME, "query-type")?,
            domain: require(record.domain.clone(), Self::NAME, "domain")?,
            responses: record.responses.clone(),
        })
    }
}

impl DnsEvent {
    pub fn is_query(&self) -> bool {
        self.responses.is_none()
    }

    pub(crate) fn fill_record(&self, record: &mut EventRecord) {
        record.source_port = Some(self.source_port);
        record.destination_port = Some(self.destination_port);
        record.transferred = Some(self.transferred);
        record.query_type = Some(self.query_type);
        record.domain = Some(self.domain.clone());
        record.responses = self.responses.clone();
    }
}
