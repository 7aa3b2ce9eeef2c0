// Library root for the waiver claim resolution engine.
//
// Leaves first: identifiers and domain types, the SQLite stores, then the
// availability oracle, conflict detector, lineup synchronizer, resolution
// transaction, and the administrative desk that ties them together.

pub mod claim;
pub mod config;
pub mod conflict;
pub mod db;
pub mod desk;
pub mod error;
pub mod ids;
pub mod lineup;
pub mod notifier;
pub mod oracle;
pub mod player;
pub mod resolution;
pub mod roster_import;
pub mod store;
pub mod sync;

pub use error::WaiverError;
