use super::{
    AuthType, ChassisPowerState, CommandApp, CommandChassis, NetworkFunctionRequestCode,
    PrivilegeLevel, BMC_SLAVE_ADDR, REMOTE_SWID,
};
use crate::error::Error;
use std::convert::Into;
use std::convert::TryFrom;

const REQUEST_LEN_MIN: usize = 7;

// sec 13.8
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    rs_addr: u8,
    netfn: u8,
    rq_addr: u8,
    rq_seq: u8,
    cmd: u8,
    data: Option<Vec<u8>>,
}

impl From<Request> for Vec<u8> {
    fn from(req: Request) -> Self {
        let mut bytes = vec![req.rs_addr, req.netfn];

        let checksum1 = checksum(&[req.rs_addr, req.netfn]);
        bytes.push(checksum1);

        bytes.push(req.rq_addr);

        bytes.push(req.rq_seq);

        bytes.push(req.cmd);

        let mut checksum2 = vec![req.rq_addr, req.rq_seq, req.cmd];

        if let Some(data) = req.data {
            checksum2.extend_from_slice(&data);
            let c = checksum(checksum2.as_slice());

            bytes.extend_from_slice(&data);
            bytes.push(c);
        } else {
            bytes.push(checksum(checksum2.as_slice()));
        }

        bytes
    }
}

impl TryFrom<&[u8]> for Request {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let size = value.len();
        if size < REQUEST_LEN_MIN {
            return Err(Error::InvalidPacketLength);
        }

        if checksum(&value[..3]) != 0 || checksum(&value[3..]) != 0 {
            return Err(Error::InvalidChecksum);
        }

        let data = if size > REQUEST_LEN_MIN {
            Some(value[6..(size - 1)].to_vec())
        } else {
            None
        };

        Ok(Request {
            rs_addr: value[0],
            netfn: value[1],
            rq_addr: value[3],
            rq_seq: value[4],
            cmd: value[5],
            data,
        })
    }
}

impl Request {
    pub fn new(
        netfn: NetworkFunctionRequestCode,
        cmd: impl Into<u8>,
        data: Option<Vec<u8>>,
    ) -> Self {
        Request::raw(netfn.request(), 0, cmd, data)
    }

    pub fn raw(netfn: u8, lun: u8, cmd: impl Into<u8>, data: Option<Vec<u8>>) -> Self {
        Request {
            rs_addr: BMC_SLAVE_ADDR,
            // rsLUN 分をシフトする。
            netfn: (netfn << 2) | (lun & 0x03),
            rq_addr: REMOTE_SWID,
            rq_seq: 0,
            cmd: cmd.into(),
            data,
        }
    }

    pub fn with_target(mut self, rs_addr: u8) -> Self {
        self.rs_addr = rs_addr;
        self
    }

    pub fn with_requester(mut self, rq_addr: u8) -> Self {
        self.rq_addr = rq_addr;
        self
    }

    pub fn with_seq(mut self, seq: u8) -> Self {
        self.rq_seq = ((seq & 0x3F) << 2) | (self.rq_seq & 0x03);
        self
    }

    pub fn rs_addr(&self) -> u8 {
        self.rs_addr
    }

    pub fn netfn(&self) -> u8 {
        self.netfn >> 2
    }

    pub fn lun(&self) -> u8 {
        self.netfn & 0x03
    }

    pub fn rq_addr(&self) -> u8 {
        self.rq_addr
    }

    pub fn seq(&self) -> u8 {
        self.rq_seq >> 2
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn is_send_message(&self) -> bool {
        self.netfn() == NetworkFunctionRequestCode::App.request()
            && self.cmd == CommandApp::SendMessage as u8
    }
}

// sec 13.8
pub(crate) fn checksum(values: &[u8]) -> u8 {
    let sum: u8 = values.iter().fold(0, |acc, &x| acc.wrapping_add(x));
    (sum ^ 0xFF).wrapping_add(1)
}

// sec 22.13
pub fn get_channel_authentication_cap(channel: u8, priv_level: PrivilegeLevel) -> Request {
    let data = vec![channel, priv_level as u8];

    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::GetChannelAuthenticationCapabilities,
        Some(data),
    )
}

// sec 22.16
pub fn get_session_challenge(auth_type: AuthType, username: &[u8; 16]) -> Request {
    let mut data = vec![auth_type as u8];
    data.extend_from_slice(username);

    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::GetSessionChallenge,
        Some(data),
    )
}

// sec 22.17
pub fn activate_session(
    auth_type: AuthType,
    priv_level: PrivilegeLevel,
    challenge: &[u8; 16],
    initial_seq: u32,
) -> Request {
    let mut data = vec![auth_type as u8, priv_level as u8];
    data.extend_from_slice(challenge);
    data.extend_from_slice(&initial_seq.to_le_bytes());

    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::ActivateSession,
        Some(data),
    )
}

// sec 22.18
pub fn set_privilege_level(priv_level: PrivilegeLevel) -> Request {
    let data = vec![priv_level as u8];

    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::SetSessionPrivilegeLevel,
        Some(data),
    )
}

// sec 22.19
pub fn close_session(session_id: u32) -> Request {
    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::CloseSession,
        Some(session_id.to_le_bytes().to_vec()),
    )
}

// sec 22.7
pub fn send_message(channel: u8, message: Vec<u8>) -> Request {
    // Track request.
    let mut data = vec![0x40 | (channel & 0x0F)];
    data.extend_from_slice(&message);

    Request::new(
        NetworkFunctionRequestCode::App,
        CommandApp::SendMessage,
        Some(data),
    )
}

// sec 20.1
pub fn get_device_id() -> Request {
    Request::new(NetworkFunctionRequestCode::App, CommandApp::GetDeviceId, None)
}

// sec 28.2
pub fn get_chassis_status() -> Request {
    Request::new(
        NetworkFunctionRequestCode::Chassis,
        CommandChassis::GetChassisStatus,
        None,
    )
}

// sec 28.3
pub fn control_chassis(state: ChassisPowerState) -> Request {
    let data = vec![state as u8];

    Request::new(
        NetworkFunctionRequestCode::Chassis,
        CommandChassis::ChassisControl,
        Some(data),
    )
}
