//! Transaction identification per RFC 3261 §17.1.3 and §17.2.3, with
//! the RFC 2543 fallback ids kept for interoperability with pre-3261
//! intermediaries.

use thiserror::Error;

use crate::message::{Message, Method};
use vega_utils::{rand_string, sha256};

/// Magic cookie marking an RFC 3261 branch.
pub const RFC3261_BRANCH_PREFIX: &str = "z9hG4bK";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("message has no via header")]
    NoVia,
    #[error("message is not a request")]
    NotRequest,
    #[error("message is not a response")]
    NotResponse,
}

/// A fresh RFC 3261 branch for a request we are about to send.
pub fn generate_branch() -> String {
    format!("{}{}", RFC3261_BRANCH_PREFIX, rand_string(20))
}

/// Client transaction match key: the branch of the top Via of the
/// request we sent, plus the CSeq method (CANCEL shares the branch of
/// the INVITE it cancels but is its own transaction).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientId {
    pub branch: String,
    pub method: Method,
}

/// Outcome of server transaction identification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerTransactionId {
    /// Opaque match key, either RFC 3261 or RFC 2543 style.
    Id(String),
    /// The request is an ACK with a pre-3261 branch. It can only be
    /// matched through the 2543 ACK algorithm against stored ack ids.
    Rfc2543Ack,
}

pub fn client_transaction_id(response: &Message) -> Result<ClientId, KeyError> {
    if response.is_request() {
        return Err(KeyError::NotResponse);
    }
    let top_via = response.via.first().ok_or(KeyError::NoVia)?;
    Ok(ClientId {
        branch: top_via.branch.clone(),
        method: response.cseq.method.clone(),
    })
}

/// Compute the match key for a server transaction from an incoming
/// request. ACK folds to INVITE so that an ACK to a non-2xx response
/// matches the INVITE transaction it acknowledges.
pub fn server_transaction_id(
    request: &Message,
) -> Result<ServerTransactionId, KeyError> {
    let method = request.method.as_ref().ok_or(KeyError::NotRequest)?;
    let top_via = request.via.first().ok_or(KeyError::NoVia)?;

    if top_via.branch.starts_with(RFC3261_BRANCH_PREFIX) {
        let method = match method {
            Method::ACK => &Method::INVITE,
            m => m,
        };
        return Ok(ServerTransactionId::Id(sha256(&format!(
            "3261:{}:{}:{}",
            top_via.branch,
            top_via.sent_by(),
            method
        ))));
    }

    if method == &Method::ACK {
        return Ok(ServerTransactionId::Rfc2543Ack);
    }

    let request_uri = request
        .request_uri
        .as_ref()
        .map(|uri| uri.to_string())
        .unwrap_or_default();
    Ok(ServerTransactionId::Id(sha256(&format!(
        "2543:{}:{}:{}:{}:{}:{}",
        request_uri,
        request.to.tag().unwrap_or(""),
        request.from.tag().unwrap_or(""),
        request.callid,
        request.cseq,
        top_via.sent_by(),
    ))))
}

/// The id under which a server INVITE transaction can later be found by
/// a 2543-style ACK. The To-tag is deliberately left out; an ACK to a
/// 2xx and an ACK to a non-2xx carry different To-tags, so the tag is
/// checked separately against the transaction's response tag.
pub fn server_transaction_ack_id_2543(
    request: &Message,
) -> Result<String, KeyError> {
    if !request.is_request() {
        return Err(KeyError::NotRequest);
    }
    let request_uri = request
        .request_uri
        .as_ref()
        .map(|uri| uri.to_string())
        .unwrap_or_default();
    Ok(sha256(&format!(
        "2543ack:{}:{}:{}:{}",
        request_uri,
        request.from.tag().unwrap_or(""),
        request.callid,
        request.cseq.seq,
    )))
}

/// Recover the server transaction id from an outbound response. The
/// response carries the Via stack of the request it answers, so for an
/// RFC 3261 branch the digest comes out identical to the one computed
/// from the request. Pre-3261 branches cannot be recovered this way.
pub fn server_transaction_id_from_response(
    response: &Message,
) -> Result<Option<String>, KeyError> {
    if response.is_request() {
        return Err(KeyError::NotResponse);
    }
    let top_via = response.via.first().ok_or(KeyError::NoVia)?;
    if !top_via.branch.starts_with(RFC3261_BRANCH_PREFIX) {
        return Ok(None);
    }
    let method = match &response.cseq.method {
        Method::ACK => &Method::INVITE,
        m => m,
    };
    Ok(Some(sha256(&format!(
        "3261:{}:{}:{}",
        top_via.branch,
        top_via.sent_by(),
        method
    ))))
}
