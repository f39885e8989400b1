use crate::ipmi::{AuthType, CompletionCode};
use std::io;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Completion,
    Transport,
    Authentication,
    Contract,
    Cancelled,
}

// Completion codes of the session commands (sec 22.16 - 22.19).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid user name")]
    InvalidUsername,
    #[error("null user name is not enabled")]
    NullUserDisabled,
    #[error("no session slot available")]
    NoSessionSlot,
    #[error("no session slot available for this user")]
    NoSlotForUser,
    #[error("no session slot available for the requested privilege level")]
    NoSlotForPrivilege,
    #[error("session sequence number out of range")]
    SequenceOutOfRange,
    #[error("invalid session id")]
    InvalidSessionId,
    #[error("requested privilege level exceeds user or channel limit")]
    PrivilegeExceedsLimit,
    #[error("requested privilege level is not available for this user")]
    PrivilegeNotAvailable,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind socket: {0}")]
    Bind(io::Error),
    #[error("failed to connect to {0}: {1}")]
    Connect(String, io::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid state: expected {expected:?}, got {actual:?}")]
    InvalidState {
        expected: crate::ipmi::SessionState,
        actual: crate::ipmi::SessionState,
    },
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("invalid packet length")]
    InvalidPacketLength,
    #[error("password longer than 16 bytes")]
    InvalidPasswordLength,
    #[error("user name longer than 16 bytes")]
    InvalidUsernameLength,
    #[error("command failed: {0}")]
    IpmiCommand(CompletionCode),
    #[error("message length {0} exceeds maximum")]
    LengthExceedsMaximum(usize),
    #[error("no common authentication type (offered mask {0:#04x})")]
    NoCommonAuthType(u8),
    #[error("no response after {0} tries")]
    NoResponse(u32),
    #[error("failed to receive packet: {0}")]
    RecvPacket(io::Error),
    #[error("request data length {0} exceeds maximum")]
    RequestTooLong(usize),
    #[error("response too short")]
    ResponseTooShort,
    #[error("failed to send packet: {0}")]
    SendPacket(io::Error),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("reply is not authenticated")]
    UnauthenticatedReply,
    #[error("unexpected RMCP message class {0:#04x}")]
    UnexpectedClass(u8),
    #[error("unsupported authentication type {0:?}")]
    UnsupportedAuthType(AuthType),
    #[error("BMC requires IPMI v2.0")]
    WrongProtocolVersion,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IpmiCommand(_) => ErrorKind::Completion,
            Error::Bind(_)
            | Error::Connect(_, _)
            | Error::InvalidChecksum
            | Error::InvalidPacketLength
            | Error::LengthExceedsMaximum(_)
            | Error::NoResponse(_)
            | Error::RecvPacket(_)
            | Error::ResponseTooShort
            | Error::SendPacket(_)
            | Error::UnexpectedClass(_) => ErrorKind::Transport,
            Error::NoCommonAuthType(_)
            | Error::Session(_)
            | Error::UnauthenticatedReply
            | Error::UnsupportedAuthType(_)
            | Error::WrongProtocolVersion => ErrorKind::Authentication,
            Error::InvalidPasswordLength
            | Error::InvalidState { .. }
            | Error::InvalidUsernameLength
            | Error::RequestTooLong(_) => ErrorKind::Contract,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    // Raw completion code when the BMC rejected the request.
    pub fn completion_code(&self) -> Option<CompletionCode> {
        match self {
            Error::IpmiCommand(code) => Some(*code),
            _ => None,
        }
    }
}
