use crate::events::{Event, TcpEndEvent};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// What closed connections are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKey {
    Duration,
    TransferredClient,
    TransferredServer,
    Transferred,
}

impl RankKey {
    fn compare(&self, a: &TcpEndEvent, b: &TcpEndEvent) -> Ordering {
        match self {
            RankKey::Duration => a.duration_micros().cmp(&b.duration_micros()),
            RankKey::TransferredClient => a.transferred_client.cmp(&b.transferred_client),
            RankKey::TransferredServer => a.transferred_server.cmp(&b.transferred_server),
            RankKey::Transferred => a.transferred().cmp(&b.transferred()),
        }
    }
}

impl FromStr for RankKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duration" => Ok(RankKey::Duration),
            "transferred-client" => Ok(RankKey::TransferredClient),
            "transferred-server" => Ok(RankKey::TransferredServer),
            "transferred" => Ok(RankKey::Transferred),
            other => Err(format!("unknown ranking key '{}'", other)),
        }
    }
}

impl fmt::Display for RankKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RankKey::Duration => "duration",
            RankKey::TransferredClient => "transferred-client",
            RankKey::TransferredServer => "transferred-server",
            RankKey::Transferred => "transferred",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Ranks the end-of-connection events in `events`. Ties keep input order in
/// both directions.
pub fn rank_connections(events: &[Event], key: RankKey, order: SortOrder) -> Vec<&TcpEndEvent> {
    let mut ends: Vec<&TcpEndEvent> = events
        .iter()
        .filter_map(|event| match event {
            Event::TcpEnd(end) => Some(end),
            _ => None,
        })
        .collect();

    match order {
        SortOrder::Ascending => ends.sort_by(|a, b| key.compare(a, b)),
        SortOrder::Descending => ends.sort_by(|a, b| key.compare(b, a)),
    }
    ends
}
