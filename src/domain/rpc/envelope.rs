use serde::{Deserialize, Serialize};

/// Routing wrapper for every frame. Replies echo the id of the request they answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub request_id: u64,
    pub body: T,
}

/// Result of a remote call. Failures travel beside the reply payload, not inside it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Fault(String),
}

impl<T> From<Result<T, String>> for Outcome<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(message) => Outcome::Fault(message),
        }
    }
}
