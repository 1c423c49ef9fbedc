//! Named control actions accepted by the service.

use bytes::Bytes;

use flightdeck_core::Plan;

pub const QUERY: &str = "query";
pub const RELEASE: &str = "release";

/// Action types advertised to clients, with a one-line description each.
pub const ADVERTISED: [(&str, &str); 2] = [
    (QUERY, "Execute a serialized plan; streams progress, then a ticket"),
    (RELEASE, "Drop the cached result behind a ticket"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Query(Plan),
    Release(Bytes),
    Unknown(String),
}

impl Action {
    /// Total over every action type: anything unrecognised becomes `Unknown`.
    pub fn parse(kind: &str, body: Bytes) -> Self {
        match kind {
            QUERY => Action::Query(Plan::new(body)),
            RELEASE => Action::Release(body),
            other => Action::Unknown(other.to_string()),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Action::Query(_) => QUERY,
            Action::Release(_) => RELEASE,
            Action::Unknown(kind) => kind,
        }
    }
}

impl From<arrow_flight::Action> for Action {
    fn from(action: arrow_flight::Action) -> Self {
        Action::parse(&action.r#type, action.body)
    }
}
