use serde::Serialize;
use std::fmt;

/// Health reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    /// `ONLINE` (including read-only standby) is active, anything else is not.
    pub fn from_state_desc(state_desc: &str) -> Self {
        if state_desc.trim().eq_ignore_ascii_case("ONLINE") {
            Status::Active
        } else {
            Status::Inactive
        }
    }
}

/// Where a staging database is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingState {
    /// Not in the instance and no saved file list
    Absent,
    Online,
    /// Read-only, accepting further restores
    Standby,
    /// Restored without recovery, accepting further restores
    Restoring,
    /// Detached by stop-staging; the file list is saved
    Detached,
    /// Any other `state_desc` (OFFLINE, SUSPECT, ...)
    Other(String),
}

impl StagingState {
    /// Map a `sys.databases` row.
    pub fn from_row(state_desc: &str, is_in_standby: &str) -> Self {
        let standby = matches!(is_in_standby.trim(), "1" | "true" | "True");
        match state_desc.trim().to_ascii_uppercase().as_str() {
            "ONLINE" if standby => StagingState::Standby,
            "ONLINE" => StagingState::Online,
            "RESTORING" => StagingState::Restoring,
            other => StagingState::Other(other.to_string()),
        }
    }

    /// Restores can be applied on top of the database.
    pub fn accepts_restores(&self) -> bool {
        matches!(self, StagingState::Standby | StagingState::Restoring)
    }
}

impl fmt::Display for StagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingState::Absent => f.write_str("absent"),
            StagingState::Online => f.write_str("online"),
            StagingState::Standby => f.write_str("standby"),
            StagingState::Restoring => f.write_str("restoring"),
            StagingState::Detached => f.write_str("detached"),
            StagingState::Other(state) => write!(f, "{}", state.to_lowercase()),
        }
    }
}
