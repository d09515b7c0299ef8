pub mod connection;
pub mod connection_key;
pub mod event_store;
pub mod merger;
pub mod ranking;
pub mod reconstruction_engine;

pub use connection::{Connection, Direction, PayloadSeries};
pub use connection_key::{ConnectionKey, Endpoint};
pub use event_store::{EventIndices, EventStore, InsertionSet, LoadReport, ServicePorts, StoreError};
pub use merger::{merge_streams, write_json_lines};
pub use ranking::{rank_connections, RankKey, SortOrder};
pub use reconstruction_engine::{
    reconstruct, reconstruct_many, start_reconstruction_engine, Reconstructor, SharedReconstructors,
};
