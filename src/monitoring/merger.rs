use crate::events::{Event, Timestamp};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;

/// Merges event streams that are each already in time order into a single
/// time-ordered stream, renumbered from 1.
///
/// On equal timestamps the event from the earlier stream comes first.
pub fn merge_streams(streams: Vec<Vec<Event>>) -> Vec<Event> {
    let total = streams.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = streams.into_iter().map(Vec::into_iter).collect();
    let mut heads: Vec<Option<Event>> = iters.iter_mut().map(Iterator::next).collect();

    let mut heap: BinaryHeap<Reverse<(Timestamp, usize)>> = heads
        .iter()
        .enumerate()
        .filter_map(|(i, head)| head.as_ref().map(|ev| Reverse((ev.timestamp(), i))))
        .collect();

    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((_, i))) = heap.pop() {
        let Some(mut event) = heads[i].take() else {
            continue;
        };

        event.base_mut().number = merged.len() as u64 + 1;
        merged.push(event);

        heads[i] = iters[i].next();
        if let Some(next) = &heads[i] {
            heap.push(Reverse((next.timestamp(), i)));
        }
    }

    merged
}

/// Writes events as JSON Lines.
pub fn write_json_lines<W: Write>(events: &[Event], mut out: W) -> std::io::Result<()> {
    for event in events {
        let line = serde_json::to_string(&event.to_record())?;
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::record;
    use serde_json::json;

    fn udp(n: u64, second: u32, src: &str) -> Event {
        Event::parse(&record(json!({
            "event-number": n,
            "date": format!("2024/01/01 00:00:{:02}.000000", second),
            "event-type": "udp",
            "source-ip": src,
            "destination-ip": "10.0.0.99",
            "source-port": 1234,
            "destination-port": 4321,
            "transferred": 1
        })))
        .unwrap()
    }

    #[test]
    fn merges_by_timestamp_and_renumbers() {
        let a = vec![udp(1, 1, "a"), udp(2, 4, "a"), udp(3, 9, "a")];
        let b = vec![udp(1, 2, "b"), udp(2, 4, "b")];
        let c = vec![];

        let merged = merge_streams(vec![a, b, c]);
        let view: Vec<(u64, u32, &str)> = merged
            .iter()
            .map(|e| {
                let base = e.base();
                let second = (base.timestamp.as_micros() / 1_000_000 % 60) as u32;
                (base.number, second, base.source_ip.as_str())
            })
            .collect();

        assert_eq!(
            view,
            vec![(1, 1, "a"), (2, 2, "b"), (3, 4, "a"), (4, 4, "b"), (5, 9, "a")]
        );
    }

    #[test]
    fn writes_one_record_per_line() {
        let events = vec![udp(1, 1, "a"), udp(2, 2, "b")];
        let mut out = Vec::new();
        write_json_lines(&events, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: shared::EventRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, events[0].to_record());
    }
}
