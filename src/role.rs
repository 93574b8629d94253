use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

/// The `a=setup` attribute of SDP, as per RFC 4145.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Setup {
    /// Attribute absent.
    #[default]
    None,
    /// Either end may initiate.
    ActPass,
    /// This end initiates the handshake.
    Active,
    /// This end awaits the handshake.
    Passive,
    /// Don't connect for now.
    HoldConn,
}

/// Whether the local description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentAction {
    /// The local description is the offer.
    Offer,
    /// The local description is the answer.
    Answer,
}

/// The part an endpoint plays in the DTLS handshake.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtlsRole {
    /// Sends the ClientHello once the underlying channel is writable.
    #[default]
    Client,
    /// Awaits a ClientHello.
    Server,
}

impl Setup {
    /// The attribute value as written in SDP. Empty for [`Setup::None`].
    pub fn setup_line(&self) -> &str {
        match self {
            Setup::None => "",
            Setup::ActPass => "actpass",
            Setup::Active => "active",
            Setup::Passive => "passive",
            Setup::HoldConn => "holdconn",
        }
    }

    /// The setup an answerer uses for a remote offer with this setup.
    ///
    /// Returns `None` when the offer can't be answered.
    pub fn answer_to(remote_offer: Setup) -> Option<Setup> {
        match remote_offer {
            // libWebRTC prefers the answerer to be the DTLS client.
            Setup::ActPass | Setup::None => Some(Setup::Active),
            Setup::Active | Setup::Passive | Setup::HoldConn => None,
        }
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setup_line())
    }
}

impl FromStr for Setup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Setup::None),
            _ if s.trim().eq_ignore_ascii_case("actpass") => Ok(Setup::ActPass),
            _ if s.trim().eq_ignore_ascii_case("active") => Ok(Setup::Active),
            _ if s.trim().eq_ignore_ascii_case("passive") => Ok(Setup::Passive),
            _ if s.trim().eq_ignore_ascii_case("holdconn") => Ok(Setup::HoldConn),
            _ => Err(format!("Unknown setup attribute: {}", s)),
        }
    }
}

impl fmt::Display for DtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtlsRole::Client => f.write_str("client"),
            DtlsRole::Server => f.write_str("server"),
        }
    }
}

/// Maps a pair of offer/answer `setup` attributes to the local DTLS role.
///
/// Follows RFC 4145 4.1 and RFC 5763 5. The offerer must say `actpass`, and
/// the answerer picks `active` (client) or `passive` (server).
pub fn negotiate_role(
    local: Setup,
    remote: Setup,
    action: ContentAction,
) -> Result<DtlsRole, NegotiationError> {
    if local == Setup::HoldConn || remote == Setup::HoldConn {
        return Err(NegotiationError::NotSupported);
    }

    let role = match action {
        ContentAction::Offer => {
            if local != Setup::ActPass {
                return Err(NegotiationError::OffererNotActpass);
            }
            match remote {
                // The peer sends the ClientHello.
                Setup::Active | Setup::None => DtlsRole::Server,
                Setup::Passive => DtlsRole::Client,
                _ => return Err(NegotiationError::AnswererRoleInvalid),
            }
        }
        ContentAction::Answer => {
            if !matches!(remote, Setup::ActPass | Setup::None) {
                return Err(NegotiationError::OffererNotActpass);
            }
            match local {
                Setup::Active => DtlsRole::Client,
                Setup::Passive => DtlsRole::Server,
                _ => return Err(NegotiationError::AnswererRoleInvalid),
            }
        }
    };

    debug!(
        "Negotiated DTLS role {} (local: {:?}, remote: {:?}, {:?})",
        role, local, remote, action
    );

    Ok(role)
}
