//! Reconstruction of TCP connections from network-observation event logs.
//!
//! Raw records are parsed into [`events::Event`]s, retained in an
//! [`monitoring::EventStore`] and replayed through a
//! [`monitoring::Reconstructor`] to rebuild each connection seen by a focus
//! address.

pub mod config;
pub mod events;
pub mod monitoring;
