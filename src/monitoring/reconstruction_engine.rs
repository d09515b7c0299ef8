use super::connection::Connection;
use super::connection_key::ConnectionKey;
use crate::events::{BaseEvent, Event, TcpBeginEvent, TcpDataEvent, TcpEndEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Counters describing what a reconstruction did with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructionStats {
    pub processed: u64,
    pub out_of_focus: u64,
    pub opened: u64,
    pub superseded: u64,
    pub closed: u64,
    pub orphan_data: u64,
    pub orphan_end: u64,
}

struct ActiveConnection {
    // insertion order into the active map
    slot: u64,
    conn: Connection,
}

/// Incremental TCP connection reconstruction for one focus address.
///
/// Events must be fed in arrival order; they are never re-sorted.
pub struct Reconstructor {
    focus: String,
    active: HashMap<ConnectionKey, ActiveConnection>,
    terminated: Vec<Connection>,
    next_slot: u64,
    stats: ReconstructionStats,
}

impl Reconstructor {
    pub fn new(focus: &str) -> Self {
        Self {
            focus: focus.to_string(),
            active: HashMap::new(),
            terminated: Vec::new(),
            next_slot: 0,
            stats: ReconstructionStats::default(),
        }
    }

    pub fn focus(&self) -> &str {
        &self.focus
    }

    pub fn stats(&self) -> &ReconstructionStats {
        &self.stats
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated.len()
    }

    pub fn process_event(&mut self, event: &Event) {
        self.stats.processed += 1;

        let base = event.base();
        if base.source_ip != self.focus && base.destination_ip != self.focus {
            self.stats.out_of_focus += 1;
            return;
        }

        match event {
            Event::TcpBegin(ev) => self.on_begin(ev),
            Event::TcpData(ev) => self.on_data(ev),
            Event::TcpEnd(ev) => self.on_end(ev),
            Event::Icmp(_) | Event::Udp(_) | Event::Dns(_) => {}
        }
    }

    fn on_begin(&mut self, event: &TcpBeginEvent) {
        let key = key_of(&event.base, event.source_port, event.destination_port);

        if let Some(previous) = self.active.remove(&key) {
            log::debug!("Connection {} re-opened before its end event", key);
            self.terminated.push(previous.conn);
            self.stats.superseded += 1;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.active.insert(
            key,
            ActiveConnection {
                slot,
                conn: Connection::open(event),
            },
        );
        self.stats.opened += 1;
    }

    fn on_data(&mut self, event: &TcpDataEvent) {
        let key = key_of(&event.base, event.source_port, event.destination_port);

        match self.active.get_mut(&key) {
            Some(entry) => entry.conn.record_data(event),
            None => {
                log::trace!("Dropping data event #{} with no open connection", event.base.number);
                self.stats.orphan_data += 1;
            }
        }
    }

    fn on_end(&mut self, event: &TcpEndEvent) {
        let key = key_of(&event.base, event.source_port, event.destination_port);

        match self.active.remove(&key) {
            Some(mut entry) => {
                entry.conn.close(event);
                self.terminated.push(entry.conn);
                self.stats.closed += 1;
            }
            None => {
                log::trace!("Dropping end event #{} with no open connection", event.base.number);
                self.stats.orphan_end += 1;
            }
        }
    }

    /// Current result without consuming the state.
    pub fn snapshot(&self) -> Vec<Connection> {
        let mut active: Vec<&ActiveConnection> = self.active.values().collect();
        active.sort_by_key(|entry| entry.slot);

        assemble(
            active.into_iter().map(|entry| entry.conn.clone()),
            self.terminated.iter().cloned(),
        )
    }

    /// Final result: still-active connections (in the order they were
    /// opened) then terminated ones (in termination order), stable-sorted
    /// by begin timestamp.
    pub fn finish(self) -> Vec<Connection> {
        let mut active: Vec<ActiveConnection> = self.active.into_values().collect();
        active.sort_by_key(|entry| entry.slot);

        assemble(active.into_iter().map(|entry| entry.conn), self.terminated)
    }
}

fn key_of(base: &BaseEvent, sport: u16, dport: u16) -> ConnectionKey {
    ConnectionKey::normalize(&base.source_ip, sport, &base.destination_ip, dport)
}

fn assemble(
    active: impl Iterator<Item = Connection>,
    terminated: impl IntoIterator<Item = Connection>,
) -> Vec<Connection> {
    let mut connections: Vec<Connection> = active.chain(terminated).collect();
    // stable: ties keep active-then-terminated order
    connections.sort_by_key(|conn| conn.begin);
    connections
}

pub fn reconstruct(events: &[Event], focus: &str) -> Vec<Connection> {
    let mut reconstructor = Reconstructor::new(focus);
    for event in events {
        reconstructor.process_event(event);
    }
    log::debug!("Reconstruction for {}: {:?}", focus, reconstructor.stats());
    reconstructor.finish()
}

/// One independent reconstruction per focus address, run in parallel over
/// the shared event list. Results come back in `focuses` order.
pub fn reconstruct_many(events: &[Event], focuses: &[String]) -> Vec<(String, Vec<Connection>)> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = focuses
            .iter()
            .map(|focus| (focus, scope.spawn(move || reconstruct(events, focus))))
            .collect();

        handles
            .into_iter()
            .map(|(focus, handle)| {
                let connections = match handle.join() {
                    Ok(connections) => connections,
                    Err(e) => std::panic::resume_unwind(e),
                };
                (focus.clone(), connections)
            })
            .collect()
    })
}

/// Reconstructors shared between the engine thread (single writer) and any
/// number of readers taking snapshots.
pub type SharedReconstructors = Arc<RwLock<Vec<Reconstructor>>>;

pub fn start_reconstruction_engine(
    event_rx: Receiver<Event>,
    state: SharedReconstructors,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        log::info!("Starting reconstruction engine...");
        run_reconstruction_engine(event_rx, state, running);
        log::info!("Reconstruction engine stopped");
    })
}

pub fn run_reconstruction_engine(
    event_rx: Receiver<Event>,
    state: SharedReconstructors,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let mut reconstructors = state.write();
                for reconstructor in reconstructors.iter_mut() {
                    reconstructor.process_event(&event);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Event channel disconnected");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::record;
    use serde_json::json;

    const A: &str = "10.0.0.1";
    const B: &str = "10.0.0.2";
    const C: &str = "10.0.0.3";

    fn at(second: u32) -> String {
        format!("2024/01/01 00:00:{:02}.000000", second)
    }

    fn begin(n: u64, t: u32, src: (&str, u16), dst: (&str, u16)) -> Event {
        Event::parse(&record(json!({
            "event-number": n,
            "date": at(t),
            "event-type": "begin-tcp-connection",
            "source-ip": src.0,
            "destination-ip": dst.0,
            "source-port": src.1,
            "destination-port": dst.1
        })))
        .unwrap()
    }

    fn data(n: u64, t: u32, src: (&str, u16), dst: (&str, u16), payload: u64) -> Event {
        Event::parse(&record(json!({
            "event-number": n,
            "date": at(t),
            "event-type": "tcp-data",
            "source-ip": src.0,
            "destination-ip": dst.0,
            "source-port": src.1,
            "destination-port": dst.1,
            "payload": payload
        })))
        .unwrap()
    }

    fn end(n: u64, t: u32, src: (&str, u16), dst: (&str, u16), client: u64, server: u64) -> Event {
        Event::parse(&record(json!({
            "event-number": n,
            "date": at(t),
            "event-type": "end-tcp-connection",
            "source-ip": src.0,
            "destination-ip": dst.0,
            "source-port": src.1,
            "destination-port": dst.1,
            "creation": at(0),
            "transferred-client": client,
            "transferred-server": server
        })))
        .unwrap()
    }

    fn udp(n: u64, t: u32, src: &str, dst: &str) -> Event {
        Event::parse(&record(json!({
            "event-number": n,
            "date": at(t),
            "event-type": "udp",
            "source-ip": src,
            "destination-ip": dst,
            "source-port": 5000,
            "destination-port": 5001,
            "transferred": 10
        })))
        .unwrap()
    }

    #[test]
    fn single_connection_scenario() {
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            data(2, 1, (A, 1000), (B, 80), 100),
            data(3, 2, (B, 80), (A, 1000), 200),
            end(4, 3, (A, 1000), (B, 80), 100, 200),
        ];

        let conns = reconstruct(&events, A);
        assert_eq!(conns.len(), 1);

        let conn = &conns[0];
        assert_eq!(conn.client.address, A);
        assert_eq!(conn.client.port, 1000);
        assert_eq!(conn.server.address, B);
        assert_eq!(conn.server.port, 80);
        assert_eq!(conn.begin.to_string(), at(0));
        assert_eq!(conn.end.map(|t| t.to_string()), Some(at(3)));
        assert_eq!(conn.last_packet.to_string(), at(3));
        assert_eq!(conn.client_payload, 100);
        assert_eq!(conn.server_payload, 200);
        assert_eq!(conn.transferred_client, 100);
        assert_eq!(conn.transferred_server, 200);
        assert_eq!(
            conn.payload_events.iter().map(|e| e.base.number).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn end_event_from_server_side_matches() {
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            end(2, 4, (B, 80), (A, 1000), 7, 9),
        ];
        let conns = reconstruct(&events, B);
        assert_eq!(conns.len(), 1);
        assert!(conns[0].is_terminated());
        assert_eq!((conns[0].transferred_client, conns[0].transferred_server), (7, 9));
    }

    #[test]
    fn orphan_data_and_end_are_dropped() {
        let events = vec![
            data(1, 0, (A, 1000), (B, 80), 100),
            end(2, 1, (A, 1000), (B, 80), 1, 1),
            begin(3, 2, (A, 1000), (B, 80)),
            data(4, 3, (A, 2000), (B, 80), 50),
        ];

        let mut r = Reconstructor::new(A);
        for ev in &events {
            r.process_event(ev);
        }
        assert_eq!(r.stats().orphan_data, 2);
        assert_eq!(r.stats().orphan_end, 1);

        let conns = r.finish();
        assert_eq!(conns.len(), 1);
        assert!(conns[0].payload_events.is_empty());
        assert_eq!(conns[0].client_payload, 0);
        assert_eq!(conns[0].end, None);
    }

    #[test]
    fn reopen_supersedes_unterminated_connection() {
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            data(2, 1, (A, 1000), (B, 80), 10),
            begin(3, 2, (A, 1000), (B, 80)),
            data(4, 3, (B, 80), (A, 1000), 20),
            end(5, 4, (A, 1000), (B, 80), 0, 20),
        ];

        let conns = reconstruct(&events, A);
        assert_eq!(conns.len(), 2);

        assert_eq!(conns[0].begin.to_string(), at(0));
        assert_eq!(conns[0].end, None);
        assert_eq!(conns[0].client_payload, 10);
        assert_eq!(conns[0].last_packet.to_string(), at(1));

        assert_eq!(conns[1].begin.to_string(), at(2));
        assert_eq!(conns[1].end.map(|t| t.to_string()), Some(at(4)));
        assert_eq!(conns[1].server_payload, 20);
        assert_eq!(conns[1].client_payload, 0);
    }

    #[test]
    fn reverse_begin_reuses_same_key() {
        // the peer opening with swapped endpoints lands on the same key
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            begin(2, 1, (B, 80), (A, 1000)),
        ];
        let conns = reconstruct(&events, A);
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[1].client.address, B);
    }

    #[test]
    fn events_outside_focus_are_ignored() {
        let events = vec![
            begin(1, 0, (B, 1000), (C, 80)),
            begin(2, 1, (A, 1001), (C, 80)),
            data(3, 2, (B, 1000), (C, 80), 5),
            udp(4, 3, A, C),
        ];
        let mut r = Reconstructor::new(A);
        for ev in &events {
            r.process_event(ev);
        }
        assert_eq!(r.stats().out_of_focus, 2);

        let conns = r.finish();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].server.address, C);
    }

    #[test]
    fn result_sorted_by_begin_regardless_of_termination_order() {
        let events = vec![
            begin(1, 5, (A, 3000), (B, 22)),
            begin(2, 1, (A, 1000), (B, 80)),
            begin(3, 3, (A, 2000), (B, 443)),
            end(4, 6, (A, 3000), (B, 22), 0, 0),
            end(5, 7, (A, 2000), (B, 443), 0, 0),
        ];
        let conns = reconstruct(&events, A);
        let begins: Vec<String> = conns.iter().map(|c| c.begin.to_string()).collect();
        assert_eq!(begins, vec![at(1), at(3), at(5)]);
    }

    #[test]
    fn equal_begins_keep_active_then_terminated_order() {
        let events = vec![
            begin(1, 1, (A, 1000), (B, 80)),
            begin(2, 1, (A, 2000), (B, 80)),
            begin(3, 1, (A, 3000), (B, 80)),
            end(4, 2, (A, 1000), (B, 80), 0, 0),
        ];
        let conns = reconstruct(&events, A);
        let ports: Vec<u16> = conns.iter().map(|c| c.client.port).collect();
        assert_eq!(ports, vec![2000, 3000, 1000]);
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let events: Vec<Event> = (0..20u32)
            .flat_map(|i| {
                let port = 1000 + (i % 7) as u16;
                vec![
                    begin(u64::from(i) * 2, i % 5, (A, port), (B, 80)),
                    data(u64::from(i) * 2 + 1, i % 5, (B, 80), (A, port), u64::from(i)),
                ]
            })
            .collect();

        let first = reconstruct(&events, A);
        for _ in 0..5 {
            assert_eq!(reconstruct(&events, A), first);
        }
    }

    #[test]
    fn snapshot_matches_finish() {
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            begin(2, 1, (A, 1001), (B, 80)),
            end(3, 2, (A, 1000), (B, 80), 1, 2),
        ];
        let mut r = Reconstructor::new(A);
        for ev in &events {
            r.process_event(ev);
        }
        assert_eq!(r.active_count(), 1);
        assert_eq!(r.terminated_count(), 1);

        let snapshot = r.snapshot();
        assert_eq!(snapshot, r.finish());
    }

    #[test]
    fn parallel_queries_match_sequential_ones() {
        let events = vec![
            begin(1, 0, (A, 1000), (B, 80)),
            begin(2, 1, (C, 1000), (B, 80)),
            data(3, 2, (B, 80), (C, 1000), 42),
        ];
        let focuses = vec![A.to_string(), B.to_string(), C.to_string()];

        let results = reconstruct_many(&events, &focuses);
        assert_eq!(results.len(), 3);
        for (focus, conns) in results {
            assert_eq!(conns, reconstruct(&events, &focus));
        }
    }

    #[test]
    fn engine_thread_consumes_channel_until_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let state: SharedReconstructors = Arc::new(RwLock::new(vec![Reconstructor::new(A)]));
        let running = Arc::new(AtomicBool::new(true));

        let handle = start_reconstruction_engine(rx, Arc::clone(&state), Arc::clone(&running));
        tx.send(begin(1, 0, (A, 1000), (B, 80))).unwrap();
        tx.send(data(2, 1, (A, 1000), (B, 80), 64)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let conns = state.read()[0].snapshot();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].client_payload, 64);
    }
}
