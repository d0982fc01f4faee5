use thiserror::Error;

/// Why a team roster could not be fetched. Roster errors never abort an
/// evaluation; the team is treated as unresolved instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("team not found: {0}")]
    NotFound(String),

    #[error("failed to fetch roster for {team}: {message}")]
    Fetch { team: String, message: String },
}

impl RosterError {
    pub fn fetch(team: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            team: team.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
