use super::response::{ActivatedSession, AuthCapabilities, Response, SessionChallenge};
use super::session::Session;
use super::{
    request, AuthType, ChassisPowerState, CommandApp, CompletionCode, PrivilegeLevel,
    CHANNEL_CURRENT,
};
use crate::error::{Error, SessionError};
use crate::transport::Transport;
use log::{debug, trace};
use std::convert::TryFrom;

// Asks for the IPMI v2.0 extended capabilities.
const CHANNEL_EXTENDED_DATA: u8 = 0x80;

pub fn get_channel_authentication_cap<T: Transport>(
    session: &mut Session<T>,
) -> Result<AuthCapabilities, Error> {
    let priv_level = session.config().requested_privilege();

    let req = request::get_channel_authentication_cap(
        CHANNEL_EXTENDED_DATA | CHANNEL_CURRENT,
        priv_level,
    );
    let res = session.session_command(req)?;

    // Pre v2.0 BMCs reject the extended data bit.
    let res = match res.code() {
        CompletionCode::Completed => res,
        code => {
            debug!("extended capabilities rejected: {}", code);
            let req = request::get_channel_authentication_cap(CHANNEL_CURRENT, priv_level);
            session.session_command(req)?.ok()?
        }
    };
    trace!("get channel authentication capabilities: {:?}", res);

    AuthCapabilities::parse(res.data())
}

pub fn get_session_challenge<T: Transport>(
    session: &mut Session<T>,
    auth_type: AuthType,
) -> Result<SessionChallenge, Error> {
    let req = request::get_session_challenge(auth_type, session.username());

    let res = session.session_command(req)?;
    let res = check(res, CommandApp::GetSessionChallenge)?;
    trace!("get session challenge: {:?}", res);

    SessionChallenge::parse(res.data())
}

pub fn activate_session<T: Transport>(
    session: &mut Session<T>,
    challenge: &[u8; 16],
    initial_seq: u32,
) -> Result<ActivatedSession, Error> {
    let req = request::activate_session(
        session.auth_type(),
        session.config().requested_privilege(),
        challenge,
        initial_seq,
    );

    let res = session.session_command(req)?;
    let res = check(res, CommandApp::ActivateSession)?;
    trace!("activate session: {:?}", res);

    ActivatedSession::parse(res.data())
}

pub fn set_privilege_level<T: Transport>(
    session: &mut Session<T>,
    priv_level: PrivilegeLevel,
) -> Result<PrivilegeLevel, Error> {
    let req = request::set_privilege_level(priv_level);

    let res = session.session_command(req)?;
    let res = check(res, CommandApp::SetSessionPrivilegeLevel)?;
    trace!("set privilege level: {:?}", res);

    let level = res
        .data()
        .first()
        .and_then(|v| PrivilegeLevel::try_from(*v).ok())
        .unwrap_or(priv_level);
    Ok(level)
}

pub fn close_session<T: Transport>(session: &mut Session<T>, session_id: u32) -> Result<(), Error> {
    let req = request::close_session(session_id);

    let res = session.session_command(req)?;
    let res = check(res, CommandApp::CloseSession)?;
    trace!("close session: {:?}", res);

    Ok(())
}

pub fn get_device_id<T: Transport>(session: &mut Session<T>) -> Result<Response, Error> {
    let res = session.command(request::get_device_id())?.ok()?;
    trace!("get device id: {:?}", res);
    Ok(res)
}

pub fn get_chassis_status<T: Transport>(session: &mut Session<T>) -> Result<Response, Error> {
    let res = session.command(request::get_chassis_status())?.ok()?;
    trace!("get chassis status: {:?}", res);
    Ok(res)
}

pub fn control_chassis<T: Transport>(
    session: &mut Session<T>,
    state: ChassisPowerState,
) -> Result<Response, Error> {
    let res = session.command(request::control_chassis(state))?.ok()?;
    trace!("control chassis: {:?}", res);
    Ok(res)
}

fn check(res: Response, cmd: CommandApp) -> Result<Response, Error> {
    match res.code() {
        CompletionCode::Completed => Ok(res),
        CompletionCode::Error(code) => Err(session_error(cmd, code)
            .map(Error::from)
            .unwrap_or(Error::IpmiCommand(res.code()))),
    }
}

// sec 22.16 - 22.19
pub fn session_error(cmd: CommandApp, code: u8) -> Option<SessionError> {
    match (cmd, code) {
        (CommandApp::GetSessionChallenge, 0x81) => Some(SessionError::InvalidUsername),
        (CommandApp::GetSessionChallenge, 0x82) => Some(SessionError::NullUserDisabled),
        (CommandApp::ActivateSession, 0x81) => Some(SessionError::NoSessionSlot),
        (CommandApp::ActivateSession, 0x82) => Some(SessionError::NoSlotForUser),
        (CommandApp::ActivateSession, 0x83) => Some(SessionError::NoSlotForPrivilege),
        (CommandApp::ActivateSession, 0x84) => Some(SessionError::SequenceOutOfRange),
        (CommandApp::ActivateSession, 0x85) => Some(SessionError::InvalidSessionId),
        (CommandApp::ActivateSession, 0x86) => Some(SessionError::PrivilegeExceedsLimit),
        (CommandApp::SetSessionPrivilegeLevel, 0x80) => Some(SessionError::PrivilegeNotAvailable),
        (CommandApp::SetSessionPrivilegeLevel, 0x81) => Some(SessionError::PrivilegeExceedsLimit),
        (CommandApp::CloseSession, 0x87) => Some(SessionError::InvalidSessionId),
        _ => None,
    }
}
