use super::response::AuthCapabilities;
use super::AuthType;
use crate::error::Error;
use log::debug;
use md2::Md2;
use md5::{Digest, Md5};

pub const AUTH_CODE_LEN: usize = 16;

// Strongest first.
const PREFERENCE: [AuthType; 4] = [
    AuthType::MD5,
    AuthType::MD2,
    AuthType::Password,
    AuthType::None,
];

impl AuthType {
    // sec 22.17.1
    pub fn auth_code(
        self,
        password: &[u8; 16],
        session_id: u32,
        message: &[u8],
        seq_number: u32,
    ) -> Result<Option<[u8; 16]>, Error> {
        match self {
            AuthType::None => Ok(None),
            AuthType::Password => Ok(Some(*password)),
            AuthType::MD5 => Ok(Some(digest::<Md5>(password, session_id, message, seq_number))),
            AuthType::MD2 => Ok(Some(digest::<Md2>(password, session_id, message, seq_number))),
            AuthType::Oem => Err(Error::UnsupportedAuthType(self)),
        }
    }
}

pub fn compute_auth_code(
    auth_type: AuthType,
    password: &[u8; 16],
    session_id: u32,
    message: &[u8],
    seq_number: u32,
) -> Result<Option<[u8; 16]>, Error> {
    auth_type.auth_code(password, session_id, message, seq_number)
}

fn digest<D: Digest>(
    password: &[u8; 16],
    session_id: u32,
    message: &[u8],
    seq_number: u32,
) -> [u8; 16] {
    let mut hasher = D::new();
    hasher.update(password);
    hasher.update(session_id.to_le_bytes());
    hasher.update(message);
    hasher.update(seq_number.to_le_bytes());
    hasher.update(password);
    let hash = hasher.finalize();

    let mut code = [0u8; AUTH_CODE_LEN];
    code.copy_from_slice(&hash[..AUTH_CODE_LEN]);
    code
}

pub fn negotiate(caps: &AuthCapabilities, pinned: Option<AuthType>) -> Result<AuthType, Error> {
    if caps.v20_only() {
        return Err(Error::WrongProtocolVersion);
    }

    let auth_type = match pinned {
        Some(auth_type) if caps.supports(auth_type) => auth_type,
        Some(_) => return Err(Error::NoCommonAuthType(caps.auth_types())),
        None => PREFERENCE
            .iter()
            .copied()
            .find(|a| caps.supports(*a))
            .ok_or_else(|| Error::NoCommonAuthType(caps.auth_types()))?,
    };

    debug!(
        "negotiated auth type {:?} from mask {:#04x}",
        auth_type,
        caps.auth_types()
    );
    Ok(auth_type)
}

/// Transform applied to the session challenge before Activate Session.
///
/// Some vendor BMC firmware hashes the Activate Session request over the
/// challenge XORed with the MD5 digest of the password. Those BMCs are
/// recognised by the OEM IANA number of their capability response, matched
/// against [`Config::xor_challenge_vendor`](crate::config::Config::xor_challenge_vendor).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeTransform {
    Standard,
    XorPasswordDigest,
}

impl ChallengeTransform {
    pub fn for_capabilities(caps: &AuthCapabilities, vendors: &[u32]) -> Self {
        debug!(
            "BMC OEM IANA {} (aux {:#04x})",
            caps.oem_iana(),
            caps.oem_aux()
        );
        ChallengeTransform::select(caps.oem_iana(), vendors)
    }

    pub fn select(oem_iana: u32, vendors: &[u32]) -> Self {
        if vendors.contains(&oem_iana) {
            debug!("vendor {} uses the password digest challenge", oem_iana);
            ChallengeTransform::XorPasswordDigest
        } else {
            ChallengeTransform::Standard
        }
    }

    pub fn apply(self, challenge: &[u8; 16], password: &[u8; 16]) -> [u8; 16] {
        match self {
            ChallengeTransform::Standard => *challenge,
            ChallengeTransform::XorPasswordDigest => {
                let key = Md5::digest(password);
                let mut transformed = *challenge;
                for (c, k) in transformed.iter_mut().zip(key.iter()) {
                    *c ^= k;
                }
                transformed
            }
        }
    }
}

// Zero padded 16 byte field, `None` when the value does not fit.
pub fn pad16(value: &[u8]) -> Option<[u8; 16]> {
    if value.len() > 16 {
        return None;
    }

    let mut field = [0u8; 16];
    field[..value.len()].copy_from_slice(value);
    Some(field)
}
