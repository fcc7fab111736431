//! Error kinds surfaced by the CAT core. Transport bindings map these
//! to whatever status codes make sense for their protocol; this crate stays
//! agnostic of HTTP.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session {0} is not ongoing")]
    SessionNotOngoing(Uuid),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("item {item_id} was not served in session {session_id}")]
    ItemNotServed { session_id: Uuid, item_id: Uuid },

    #[error("option {option_id} does not belong to item {item_id}")]
    OptionMismatch { item_id: Uuid, option_id: Uuid },

    #[error("topic {topic_id} does not belong to subject {subject_id}")]
    TopicNotInSubject { topic_id: Uuid, subject_id: Uuid },

    #[error("no eligible item could be selected")]
    NoEligibleItem,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
