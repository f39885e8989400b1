use super::pkt15::le_u32;
use super::request::{checksum, Request};
use super::{AuthType, CompletionCode, PrivilegeLevel};
use crate::error::Error;
use std::convert::TryFrom;
use std::convert::TryInto;

const RESPONSE_LEN_MIN: usize = 8;

// sec 13.8
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    rq_addr: u8,
    netfn: u8,
    rs_addr: u8,
    rq_seq: u8,
    cmd: u8,
    code: CompletionCode,
    data: Option<Vec<u8>>,
}

impl From<Response> for Vec<u8> {
    fn from(res: Response) -> Self {
        let mut bytes = vec![res.rq_addr, res.netfn];
        bytes.push(checksum(&bytes));

        let start = bytes.len();
        bytes.extend_from_slice(&[res.rs_addr, res.rq_seq, res.cmd, res.code.raw()]);
        if let Some(data) = res.data {
            bytes.extend_from_slice(&data);
        }
        let c = checksum(&bytes[start..]);
        bytes.push(c);

        bytes
    }
}

impl Response {
    // Builds the answer the responder would send back for `req`.
    pub fn reply(req: &Request, code: CompletionCode, data: Option<Vec<u8>>) -> Self {
        Response {
            rq_addr: req.rq_addr(),
            netfn: ((req.netfn() | 0x01) << 2) | req.lun(),
            rs_addr: req.rs_addr(),
            rq_seq: req.seq() << 2,
            cmd: req.cmd(),
            code,
            data,
        }
    }

    pub fn rq_addr(&self) -> u8 {
        self.rq_addr
    }

    pub fn netfn(&self) -> u8 {
        self.netfn >> 2
    }

    pub fn rs_addr(&self) -> u8 {
        self.rs_addr
    }

    pub fn rq_seq(&self) -> u8 {
        self.rq_seq >> 2
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn code(&self) -> CompletionCode {
        self.code
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn ok(self) -> Result<Response, Error> {
        match self.code {
            CompletionCode::Completed => Ok(self),
            code => Err(Error::IpmiCommand(code)),
        }
    }

    pub fn parse(response: &[u8]) -> Result<Response, Error> {
        let size = response.len();
        if size < RESPONSE_LEN_MIN {
            return Err(Error::ResponseTooShort);
        }

        if checksum(&response[..3]) != 0 || checksum(&response[3..]) != 0 {
            return Err(Error::InvalidChecksum);
        }

        let mut res = Response {
            rq_addr: response[0],
            netfn: response[1],
            rs_addr: response[3],
            rq_seq: response[4],
            cmd: response[5],
            code: CompletionCode::from(response[6]),
            data: None,
        };

        if size > RESPONSE_LEN_MIN {
            // remove last checksum (1 bytes).
            res.data = Some(response[7..(size - 1)].to_vec());
        }

        Ok(res)
    }
}

// sec 22.13
#[derive(Clone, Debug, PartialEq)]
pub struct AuthCapabilities {
    channel: u8,
    auth_types: u8,
    status: u8,
    extended: u8,
    oem_iana: u32,
    oem_aux: u8,
}

impl AuthCapabilities {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn auth_types(&self) -> u8 {
        self.auth_types & 0x3F
    }

    pub fn supports(&self, auth_type: AuthType) -> bool {
        (self.auth_types() & auth_type.mask()) != 0
    }

    pub fn v20_data(&self) -> bool {
        (self.auth_types & 0x80) != 0
    }

    pub fn per_message_auth(&self) -> bool {
        (self.status & 0x10) == 0
    }

    pub fn user_level_auth(&self) -> bool {
        (self.status & 0x08) == 0
    }

    pub fn non_null_users(&self) -> bool {
        (self.status & 0x04) != 0
    }

    pub fn null_users(&self) -> bool {
        (self.status & 0x02) != 0
    }

    pub fn anonymous_login(&self) -> bool {
        (self.status & 0x01) != 0
    }

    pub fn supports_v15(&self) -> bool {
        !self.v20_data() || (self.extended & 0x01) != 0
    }

    pub fn supports_v20(&self) -> bool {
        self.v20_data() && (self.extended & 0x02) != 0
    }

    pub fn v20_only(&self) -> bool {
        self.supports_v20() && !self.supports_v15()
    }

    pub fn oem_iana(&self) -> u32 {
        self.oem_iana
    }

    pub fn oem_aux(&self) -> u8 {
        self.oem_aux
    }

    pub fn parse(data: &[u8]) -> Result<AuthCapabilities, Error> {
        if data.len() < 8 {
            return Err(Error::InvalidPacketLength);
        }

        Ok(AuthCapabilities {
            channel: data[0],
            auth_types: data[1],
            status: data[2],
            extended: data[3],
            oem_iana: u32::from_le_bytes([data[4], data[5], data[6], 0x00]),
            oem_aux: data[7],
        })
    }
}

// sec 22.16
#[derive(Clone, Debug, PartialEq)]
pub struct SessionChallenge {
    session_id: u32,
    challenge: [u8; 16],
}

impl SessionChallenge {
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn challenge(&self) -> &[u8; 16] {
        &self.challenge
    }

    pub fn parse(data: &[u8]) -> Result<SessionChallenge, Error> {
        if data.len() < 20 {
            return Err(Error::InvalidPacketLength);
        }

        Ok(SessionChallenge {
            session_id: le_u32(&data[0..4])?,
            challenge: data[4..20]
                .try_into()
                .map_err(|_| Error::InvalidPacketLength)?,
        })
    }
}

// sec 22.17
#[derive(Clone, Debug, PartialEq)]
pub struct ActivatedSession {
    auth_type: u8,
    session_id: u32,
    inbound_seq: u32,
    max_priv_level: u8,
}

impl ActivatedSession {
    pub fn auth_type(&self) -> Result<AuthType, Error> {
        AuthType::try_from(self.auth_type).map_err(|_| Error::InvalidPacketLength)
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn inbound_seq(&self) -> u32 {
        self.inbound_seq
    }

    pub fn max_priv_level(&self) -> Option<PrivilegeLevel> {
        PrivilegeLevel::try_from(self.max_priv_level).ok()
    }

    pub fn parse(data: &[u8]) -> Result<ActivatedSession, Error> {
        if data.len() < 10 {
            return Err(Error::InvalidPacketLength);
        }

        Ok(ActivatedSession {
            auth_type: data[0] & 0x0F,
            session_id: le_u32(&data[1..5])?,
            inbound_seq: le_u32(&data[5..9])?,
            max_priv_level: data[9] & 0x0F,
        })
    }
}
