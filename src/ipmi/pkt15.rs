use super::AuthType;
use crate::error::Error;
use crate::rmcp;
use std::convert::Into;
use std::convert::TryFrom;
use std::convert::TryInto;

const HEADER_LEN_MIN: usize = 10;
const AUTH_CODE_LEN: usize = 16;

// Smallest IPMI message worth decoding after the session header.
const MESSAGE_LEN_MIN: usize = 6;

// sec 13.6
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    auth_type: u8,
    session_number: u32,
    session_id: u32,
    auth_code: Option<[u8; 16]>,
    payload_len: u8,
}

impl From<Header> for Vec<u8> {
    fn from(header: Header) -> Self {
        let mut bytes = vec![header.auth_type];

        bytes.extend_from_slice(&header.session_number.to_le_bytes());

        bytes.extend_from_slice(&header.session_id.to_le_bytes());

        if let Some(auth_code) = header.auth_code {
            bytes.extend_from_slice(&auth_code);
        }

        bytes.push(header.payload_len);

        bytes
    }
}

impl Header {
    pub fn new(
        auth_type: AuthType,
        session_number: u32,
        session_id: u32,
        payload_len: usize,
    ) -> Result<Self, Error> {
        let len =
            u8::try_from(payload_len).map_err(|_| Error::LengthExceedsMaximum(payload_len))?;
        Ok(Header {
            auth_type: auth_type as u8,
            session_number,
            session_id,
            auth_code: None,
            payload_len: len,
        })
    }

    pub fn with_auth_code(mut self, auth_code: Option<[u8; 16]>) -> Self {
        self.auth_code = auth_code;
        self
    }

    pub fn auth_type(&self) -> u8 {
        self.auth_type
    }

    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn auth_code(&self) -> Option<&[u8; 16]> {
        self.auth_code.as_ref()
    }

    pub fn payload_len(&self) -> u8 {
        self.payload_len
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_type != AuthType::None as u8
    }

    fn len(&self) -> usize {
        HEADER_LEN_MIN + self.auth_code.map(|_| AUTH_CODE_LEN).unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct Packet {
    header: Header,
    payload: Vec<u8>,
}

impl From<Packet> for Vec<u8> {
    fn from(pkt: Packet) -> Self {
        let mut bytes = vec![];

        let header: Vec<u8> = pkt.header.into();
        bytes.extend_from_slice(&header);

        bytes.extend_from_slice(&pkt.payload);

        bytes
    }
}

impl TryFrom<&[u8]> for Packet {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let size = value.len();
        if size < HEADER_LEN_MIN {
            return Err(Error::ResponseTooShort);
        }

        let mut header = Header {
            auth_type: value[0],
            session_number: le_u32(&value[1..5])?,
            session_id: le_u32(&value[5..9])?,
            auth_code: None,
            payload_len: 0,
        };

        // The remote may answer without an auth code even when asked with
        // one, so the layout follows the auth type it actually used.
        if header.is_authenticated() {
            if size < HEADER_LEN_MIN + AUTH_CODE_LEN {
                return Err(Error::ResponseTooShort);
            }
            let auth_code = value[9..25]
                .try_into()
                .map_err(|_| Error::InvalidPacketLength)?;
            header.auth_code = Some(auth_code);
            header.payload_len = value[25];
        } else {
            header.payload_len = value[9];
        }

        let payload_start = header.len();
        if size < payload_start + MESSAGE_LEN_MIN {
            return Err(Error::ResponseTooShort);
        }

        // Anything past the message length is the RMCP pad byte.
        let payload_end = payload_start + header.payload_len as usize;
        if size < payload_end {
            return Err(Error::InvalidPacketLength);
        }

        Ok(Packet::new(header, &value[payload_start..payload_end]))
    }
}

impl Packet {
    pub fn new(header: Header, payload: impl Into<Vec<u8>>) -> Self {
        Packet {
            header,
            payload: payload.into(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    pub fn encode(self) -> Vec<u8> {
        let bytes: Vec<u8> = self.into();
        rmcp::Packet::ipmi(bytes).into()
    }

    // Decodes a whole datagram, RMCP header included.
    pub fn decode(value: &[u8]) -> Result<Packet, Error> {
        let header = rmcp::Header::parse(value)?;
        if !header.is_ipmi() {
            return Err(Error::UnexpectedClass(header.class()));
        }

        Packet::try_from(&value[rmcp::HEADER_LEN..])
    }
}

pub(crate) fn le_u32(value: &[u8]) -> Result<u32, Error> {
    let bytes = value.try_into().map_err(|_| Error::InvalidPacketLength)?;
    Ok(u32::from_le_bytes(bytes))
}
