use super::error::Error;
use std::convert::Into;
use std::convert::TryInto;

pub const HEADER_LEN: usize = 4;

// ASF IANA enterprise number.
const ASF_IANA: u32 = 0x0000_11BE;
const ASF_TYPE_PING: u8 = 0x80;
const ASF_TYPE_PONG: u8 = 0x40;
const PONG_LEN: usize = 16;

// Wire lengths the legacy BMCs cannot handle, sent with one extra pad byte.
const PAD_LENGTHS: [usize; 5] = [56, 84, 112, 128, 156];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Version {
    V1 = 0x06,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MessageClass {
    Asf = 0x06,
    Ipmi = 0x07,
}

// sec 13.1.3
#[derive(Debug, PartialEq)]
pub struct Header {
    version: u8,
    seq_number: u8,
    class: u8,
}

impl From<Header> for Vec<u8> {
    fn from(header: Header) -> Vec<u8> {
        vec![header.version, 0x00, header.seq_number, header.class]
    }
}

impl Header {
    pub fn ipmi() -> Self {
        Header {
            version: Version::V1 as u8,
            seq_number: 0xFF,
            class: MessageClass::Ipmi as u8,
        }
    }

    pub fn asf() -> Self {
        Header {
            version: Version::V1 as u8,
            seq_number: 0xFF,
            class: MessageClass::Asf as u8,
        }
    }

    pub fn class(&self) -> u8 {
        self.class & 0x1F
    }

    pub fn is_ipmi(&self) -> bool {
        self.class() == MessageClass::Ipmi as u8
    }

    pub fn is_asf(&self) -> bool {
        self.class() == MessageClass::Asf as u8
    }

    pub fn parse(value: &[u8]) -> Result<Header, Error> {
        if value.len() < HEADER_LEN {
            return Err(Error::ResponseTooShort);
        }

        Ok(Header {
            version: value[0],
            seq_number: value[2],
            class: value[3],
        })
    }
}

#[derive(Debug)]
pub struct Packet {
    header: Header,
    data: Vec<u8>,
}

impl From<Packet> for Vec<u8> {
    fn from(pkt: Packet) -> Vec<u8> {
        let pad = pkt.header.is_ipmi();
        let mut p: Vec<u8> = pkt.header.into();
        p.extend_from_slice(&pkt.data);
        if pad && PAD_LENGTHS.contains(&p.len()) {
            p.push(0x00);
        }
        p
    }
}

impl Packet {
    pub fn ipmi(data: impl Into<Vec<u8>>) -> Self {
        Packet {
            header: Header::ipmi(),
            data: data.into(),
        }
    }

    pub fn asf(data: impl Into<Vec<u8>>) -> Self {
        Packet {
            header: Header::asf(),
            data: data.into(),
        }
    }
}

// ASF sec 3.2.4.2, presence ping.
pub fn ping(tag: u8) -> Vec<u8> {
    let mut data = ASF_IANA.to_be_bytes().to_vec();
    data.extend_from_slice(&[ASF_TYPE_PING, tag, 0x00, 0x00]);
    Packet::asf(data).into()
}

// ASF sec 3.2.4.3
#[derive(Debug, PartialEq)]
pub struct Pong {
    tag: u8,
    iana: u32,
    oem: u32,
    entities: u8,
    interactions: u8,
}

impl Pong {
    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn iana(&self) -> u32 {
        self.iana
    }

    pub fn oem(&self) -> u32 {
        self.oem
    }

    pub fn ipmi_supported(&self) -> bool {
        (self.entities & 0x80) != 0
    }

    pub fn interactions(&self) -> u8 {
        self.interactions
    }

    // Returns `Ok(None)` for RMCP frames that are not a pong.
    pub fn parse(value: &[u8]) -> Result<Option<Pong>, Error> {
        let header = Header::parse(value)?;
        if !header.is_asf() {
            return Ok(None);
        }

        let asf = &value[HEADER_LEN..];
        if asf.len() < 8 {
            return Err(Error::ResponseTooShort);
        }

        if asf[4] != ASF_TYPE_PONG {
            return Ok(None);
        }

        let data = &asf[8..];
        if data.len() < PONG_LEN {
            return Err(Error::ResponseTooShort);
        }

        Ok(Some(Pong {
            tag: asf[5],
            iana: u32::from_be_bytes(data[0..4].try_into().map_err(|_| Error::ResponseTooShort)?),
            oem: u32::from_be_bytes(data[4..8].try_into().map_err(|_| Error::ResponseTooShort)?),
            entities: data[8],
            interactions: data[9],
        }))
    }
}
