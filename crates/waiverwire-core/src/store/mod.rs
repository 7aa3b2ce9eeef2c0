// Row-level stores. Each wraps a borrowed connection so the same code runs
// inside a plain connection, a transaction, or a savepoint.

pub mod claims;
pub mod lineup;
pub mod roster;

pub use claims::ClaimStore;
pub use lineup::LineupStore;
pub use roster::RosterStore;
