// Availability oracle: "is this player on any roster right now?"

use rusqlite::Connection;

use crate::error::WaiverError;
use crate::ids::{PlayerId, TeamId};
use crate::store::RosterStore;

/// Read-only view over roster assignments.
///
/// Every call reads the connection it was built on, so inside a resolution
/// transaction it sees exactly the state that transaction will mutate. It
/// holds no cache; build one per operation.
pub struct AvailabilityOracle<'c> {
    roster: RosterStore<'c>,
}

impl<'c> AvailabilityOracle<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        AvailabilityOracle {
            roster: RosterStore::new(conn),
        }
    }

    pub fn is_rostered(&self, player: PlayerId) -> Result<bool, WaiverError> {
        Ok(self.roster.owner_of(player)?.is_some())
    }

    pub fn owner_of(&self, player: PlayerId) -> Result<Option<TeamId>, WaiverError> {
        self.roster.owner_of(player)
    }
}
