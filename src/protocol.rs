//! SSH agent wire protocol framing.
//!
//! Every message on the wire is a 4-byte big-endian length followed by that
//! many payload bytes, the first of which is the message type tag. The
//! proxy never looks past the tag; whole messages are only consumed where a
//! full response must be read (health checks and the test mock agent).

use std::io::Read;

use crate::errors::ProxyError;

/// Client request for the identity list.
pub const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
/// Successful identity-list response.
pub const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
/// Generic failure response.
pub const SSH_AGENT_FAILURE: u8 = 5;
/// Generic success response.
pub const SSH_AGENT_SUCCESS: u8 = 6;
/// Key management requests. Forwarded opaquely like everything else; the
/// constants exist for the mock agent used in tests.
pub const SSH_AGENTC_ADD_IDENTITY: u8 = 17;
pub const SSH_AGENTC_REMOVE_IDENTITY: u8 = 18;
pub const SSH_AGENTC_REMOVE_ALL_IDENTITIES: u8 = 19;

/// Upper bound accepted for a declared message length. Anything larger is
/// a protocol violation and is rejected before allocation.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Length prefix plus type tag, the portion a validation probe reads.
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Canonical request-identities message.
pub const REQUEST_IDENTITIES_MSG: [u8; 5] = [0, 0, 0, 1, SSH_AGENTC_REQUEST_IDENTITIES];

/// Canonical failure message, sent to clients that cannot be forwarded.
pub const FAILURE_MSG: [u8; 5] = [0, 0, 0, 1, SSH_AGENT_FAILURE];

/// Frame a message consisting of `tag` followed by `body`.
pub fn encode_message(tag: u8, body: &[u8]) -> Vec<u8> {
    let len = (body.len() + 1) as u32;
    let mut msg = Vec::with_capacity(4 + body.len() + 1);
    msg.extend_from_slice(&len.to_be_bytes());
    msg.push(tag);
    msg.extend_from_slice(body);
    msg
}

/// Read one length-prefixed message and return its payload, tag byte first.
///
/// The declared length is checked against [`MAX_MESSAGE_SIZE`] before any
/// buffer is allocated, so a hostile peer cannot force an unbounded read.
pub fn read_message<R: Read>(r: &mut R) -> Result<Vec<u8>, ProxyError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(ProxyError::Oversized(len));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
