mod models;

pub use models::{ConnectionSummary, EventRecord, IndexSets, PayloadRow};
