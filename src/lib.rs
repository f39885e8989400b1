pub mod config;
pub mod error;
pub mod ipmi;
pub mod rmcp;
pub mod transport;

use self::config::Config;
use self::error::Error;
use self::ipmi::{command, ChassisPowerState, CompletionCode, Session};
use self::transport::Transport;
use log::trace;

/// Opens an authenticated session with the strongest common auth type.
pub fn open(node: &str, port: u16, user: &str, password: &str) -> Result<Session, Error> {
    let config = Config::new(node)
        .port(port)
        .username(user)
        .password(password);
    open_with(config)
}

pub fn open_with(config: Config) -> Result<Session, Error> {
    let mut session = Session::new(config)?;
    session.connect()?;
    session.open()?;
    trace!("session opened: {:#010x}", session.session_id());
    Ok(session)
}

/// The session id is forgotten even when the BMC does not answer.
pub fn close<T: Transport>(mut session: Session<T>) -> Result<(), Error> {
    session.close()
}

pub fn raw_command<T: Transport>(
    session: &mut Session<T>,
    netfn: u8,
    lun: u8,
    target_addr: u8,
    bus: u8,
    cmd: u8,
    data: &[u8],
) -> Result<(CompletionCode, Vec<u8>), Error> {
    let res = session.raw_command(netfn, lun, target_addr, bus, cmd, data)?;
    Ok((res.code(), res.data().to_vec()))
}

// Returns whether the system power is on.
pub fn run_chassis_status(config: Config) -> Result<bool, Error> {
    let mut session = open_with(config)?;

    let res = command::get_chassis_status(&mut session)?;
    trace!("get chassis status: {:?}", res);

    let power_on = res.data().first().map(|v| v & 0x01 != 0).unwrap_or(false);

    close(session)?;

    Ok(power_on)
}

pub fn run_chassis_control(config: Config, state: ChassisPowerState) -> Result<(), Error> {
    let mut session = open_with(config)?;

    let res = command::control_chassis(&mut session, state)?;
    trace!("control chassis: {:?}", res);

    close(session)?;

    Ok(())
}
