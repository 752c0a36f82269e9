//! NUT-07: Spendable Check
//!
//! <https://github.com/cashubtc/nuts/blob/main/07.md>

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut01::PublicKey;

/// NUT07 Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Unknown State error
    #[error("Unknown state")]
    UnknownState,
}

/// State of Proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Spent
    Spent,
    /// Unspent
    Unspent,
    /// Pending
    ///
    /// Currently being used in a transaction i.e. melt in progress
    Pending,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Spent => "SPENT",
            State::Unspent => "UNSPENT",
            State::Pending => "PENDING",
        };

        write!(f, "{s}")
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "SPENT" => Ok(Self::Spent),
            "UNSPENT" => Ok(Self::Unspent),
            "PENDING" => Ok(Self::Pending),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Check spendable request [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// Y's of the proofs to check
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// Proof state [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofState {
    /// Y of proof
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// State of proof
    pub state: State,
}

impl From<(PublicKey, State)> for ProofState {
    fn from((y, state): (PublicKey, State)) -> Self {
        Self { y, state }
    }
}

/// Check Spendable Response [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// Proof states
    pub states: Vec<ProofState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_format() {
        assert_eq!(serde_json::to_string(&State::Pending).unwrap(), "\"PENDING\"");
        assert_eq!(State::from_str("SPENT").unwrap(), State::Spent);
        assert_eq!(State::from_str("spent"), Err(Error::UnknownState));
    }

    #[test]
    fn check_state_request_field_names() {
        let json = r#"{"Ys":["02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104"]}"#;
        let request: CheckStateRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.ys.len(), 1);

        let response = CheckStateResponse {
            states: vec![(request.ys[0], State::Unspent).into()],
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"states":[{"Y":"02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104","state":"UNSPENT"}]}"#
        );
    }
}
