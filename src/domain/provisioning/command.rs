use serde::{Deserialize, Serialize};

use crate::domain::match_format::MatchType;
use crate::domain::reservation::reservation::ServerDescriptor;
use crate::domain::utils::id::{MatchId, SteamId};
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetupServer {
    pub match_id: MatchId,
    pub server: ServerDescriptor,
    pub match_type: MatchType,
    pub league: String,
    pub whitelist: String,
    pub map: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReExecConfig {
    pub match_id: MatchId,
    pub change_map: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifyInfo {
    pub server: ServerDescriptor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AllowPlayer {
    pub match_id: MatchId,
    pub steam_id: SteamId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DisallowPlayer {
    pub match_id: MatchId,
    pub steam_id: SteamId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Say {
    pub match_id: MatchId,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct End {
    pub match_id: MatchId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exists {
    pub match_id: MatchId,
}

/// Whether a failed call must stop the workflow or is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Authoritative,
    BestEffort,
}

/// Every call the control service accepts. Closed set, one typed payload per method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlRequest {
    SetupServer(SetupServer),
    ReExecConfig(ReExecConfig),
    VerifyInfo(VerifyInfo),
    AllowPlayer(AllowPlayer),
    DisallowPlayer(DisallowPlayer),
    Say(Say),
    End(End),
    Exists(Exists),
}

impl ControlRequest {
    /// Method name as the control service registers it.
    pub fn method(&self) -> &'static str {
        match self {
            ControlRequest::SetupServer(_) => "Pauling.SetupServer",
            ControlRequest::ReExecConfig(_) => "Pauling.ReExecConfig",
            ControlRequest::VerifyInfo(_) => "Pauling.VerifyInfo",
            ControlRequest::AllowPlayer(_) => "Pauling.AllowPlayer",
            ControlRequest::DisallowPlayer(_) => "Pauling.DisallowPlayer",
            ControlRequest::Say(_) => "Pauling.Say",
            ControlRequest::End(_) => "Pauling.End",
            ControlRequest::Exists(_) => "Pauling.Exists",
        }
    }

    /// `VerifyInfo` is the only call not scoped to a match.
    pub fn match_id(&self) -> Option<&MatchId> {
        match self {
            ControlRequest::SetupServer(args) => Some(&args.match_id),
            ControlRequest::ReExecConfig(args) => Some(&args.match_id),
            ControlRequest::VerifyInfo(_) => None,
            ControlRequest::AllowPlayer(args) => Some(&args.match_id),
            ControlRequest::DisallowPlayer(args) => Some(&args.match_id),
            ControlRequest::Say(args) => Some(&args.match_id),
            ControlRequest::End(args) => Some(&args.match_id),
            ControlRequest::Exists(args) => Some(&args.match_id),
        }
    }

    pub fn class(&self) -> OperationClass {
        match self {
            ControlRequest::Say(_) | ControlRequest::End(_) => OperationClass::BestEffort,
            _ => OperationClass::Authoritative,
        }
    }
}

/// Reply payloads. Most calls answer with nothing; errors travel in the frame, not here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlReply {
    Empty,
    Exists(bool),
}

/// Pairs a request payload with the reply it expects.
pub trait ControlCall: Into<ControlRequest> + Send {
    type Output: Send;

    fn output(reply: ControlReply) -> Result<Self::Output>;
}

macro_rules! unit_call {
    ($($payload:ident),* $(,)?) => {
        $(
            impl From<$payload> for ControlRequest {
                fn from(args: $payload) -> Self {
                    ControlRequest::$payload(args)
                }
            }

            impl ControlCall for $payload {
                type Output = ();

                fn output(reply: ControlReply) -> Result<()> {
                    match reply {
                        ControlReply::Empty => Ok(()),
                        other => Err(Error::Decode(format!("{} expected an empty reply, got {:?}", stringify!($payload), other))),
                    }
                }
            }
        )*
    };
}

unit_call!(SetupServer, ReExecConfig, VerifyInfo, AllowPlayer, DisallowPlayer, Say, End);

impl From<Exists> for ControlRequest {
    fn from(args: Exists) -> Self {
        ControlRequest::Exists(args)
    }
}

impl ControlCall for Exists {
    type Output = bool;

    fn output(reply: ControlReply) -> Result<bool> {
        match reply {
            ControlReply::Exists(exists) => Ok(exists),
            other => Err(Error::Decode(format!("Exists expected a boolean reply, got {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_match_scoped_call_carries_the_match_id() {
        let match_id = MatchId::new("7");
        let steam_id = SteamId::new("76561198000000001");
        let requests: Vec<ControlRequest> = vec![
            ReExecConfig { match_id: match_id.clone(), change_map: false }.into(),
            AllowPlayer { match_id: match_id.clone(), steam_id: steam_id.clone() }.into(),
            DisallowPlayer { match_id: match_id.clone(), steam_id }.into(),
            Say { match_id: match_id.clone(), text: "gl hf".into() }.into(),
            End { match_id: match_id.clone() }.into(),
            Exists { match_id: match_id.clone() }.into(),
        ];
        for request in &requests {
            assert_eq!(request.match_id(), Some(&match_id), "{}", request.method());
            assert!(request.method().starts_with("Pauling."));
        }
    }

    #[test]
    fn only_say_and_end_are_best_effort() {
        let match_id = MatchId::new("7");
        assert_eq!(ControlRequest::from(End { match_id: match_id.clone() }).class(), OperationClass::BestEffort);
        assert_eq!(ControlRequest::from(Say { match_id: match_id.clone(), text: String::new() }).class(), OperationClass::BestEffort);
        assert_eq!(ControlRequest::from(Exists { match_id }).class(), OperationClass::Authoritative);
    }

    #[test]
    fn mismatched_reply_is_a_decode_failure() {
        assert!(matches!(AllowPlayer::output(ControlReply::Exists(true)), Err(Error::Decode(_))));
        assert!(matches!(Exists::output(ControlReply::Empty), Err(Error::Decode(_))));
        assert!(Exists::output(ControlReply::Exists(true)).unwrap());
    }
}
