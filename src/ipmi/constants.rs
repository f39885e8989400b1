use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

pub const BMC_SLAVE_ADDR: u8 = 0x20;
pub const REMOTE_SWID: u8 = 0x81;
pub const RMCP_PORT: u16 = 623;

// Current channel.
pub const CHANNEL_CURRENT: u8 = 0x0E;

// Maximum length of an IPMI message carried in a v1.5 session.
pub const MESSAGE_LEN_MAX: usize = 255;

// sec 13.6
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    None = 0x00,
    MD2 = 0x01,
    MD5 = 0x02,
    Password = 0x04,
    Oem = 0x05,
}

impl AuthType {
    // sec 22.13, bit position in the authentication type support mask.
    pub fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

impl TryFrom<u8> for AuthType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0x0F {
            0x00 => Ok(AuthType::None),
            0x01 => Ok(AuthType::MD2),
            0x02 => Ok(AuthType::MD5),
            0x04 => Ok(AuthType::Password),
            0x05 => Ok(AuthType::Oem),
            _ => Err(value),
        }
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AuthType::None),
            "md2" => Ok(AuthType::MD2),
            "md5" => Ok(AuthType::MD5),
            "password" => Ok(AuthType::Password),
            "oem" => Ok(AuthType::Oem),
            _ => Err(s.to_string()),
        }
    }
}

// sec 28.3
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChassisPowerState {
    PowerDown = 0x00,
    PowerUp = 0x01,
    PowerCycle = 0x02,
    HardReset = 0x03,
    Diagnostic = 0x04,
    Acpi = 0x05,
}

impl FromStr for ChassisPowerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "powerdown" => Ok(ChassisPowerState::PowerDown),
            "powerup" => Ok(ChassisPowerState::PowerUp),
            "powercycle" => Ok(ChassisPowerState::PowerCycle),
            "hardreset" => Ok(ChassisPowerState::HardReset),
            "diagnostic" => Ok(ChassisPowerState::Diagnostic),
            "acpi" => Ok(ChassisPowerState::Acpi),
            _ => Err(s.to_string()),
        }
    }
}

// Appendix G
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandApp {
    GetDeviceId = 0x01,
    SendMessage = 0x34,
    GetChannelAuthenticationCapabilities = 0x38,
    GetSessionChallenge = 0x39,
    ActivateSession = 0x3A,
    SetSessionPrivilegeLevel = 0x3B,
    CloseSession = 0x3C,
}

impl From<CommandApp> for u8 {
    fn from(cmd: CommandApp) -> Self {
        cmd as u8
    }
}

// Appendix G
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandChassis {
    GetChassisStatus = 0x01,
    ChassisControl = 0x02,
}

impl From<CommandChassis> for u8 {
    fn from(cmd: CommandChassis) -> Self {
        cmd as u8
    }
}

// sec 5.2
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionCode {
    Completed,
    Error(u8),
}

impl From<u8> for CompletionCode {
    fn from(value: u8) -> Self {
        match value {
            0 => CompletionCode::Completed,
            _ => CompletionCode::Error(value),
        }
    }
}

impl From<CompletionCode> for u8 {
    fn from(code: CompletionCode) -> Self {
        match code {
            CompletionCode::Completed => 0x00,
            CompletionCode::Error(v) => v,
        }
    }
}

impl CompletionCode {
    pub fn raw(self) -> u8 {
        u8::from(self)
    }

    // Generic codes only, command specific codes (0x01-0x7E, 0x80-0xBE)
    // are decoded by the command that received them.
    pub fn description(self) -> &'static str {
        match self.raw() {
            0x00 => "command completed normally",
            0xC0 => "node busy",
            0xC1 => "invalid command",
            0xC2 => "command invalid for given LUN",
            0xC3 => "timeout while processing command",
            0xC4 => "out of space",
            0xC5 => "reservation canceled or invalid reservation ID",
            0xC6 => "request data truncated",
            0xC7 => "request data length invalid",
            0xC8 => "request data field length limit exceeded",
            0xC9 => "parameter out of range",
            0xCA => "cannot return number of requested data bytes",
            0xCB => "requested sensor, data, or record not present",
            0xCC => "invalid data field in request",
            0xCD => "command illegal for specified sensor or record type",
            0xCE => "command response could not be provided",
            0xCF => "cannot execute duplicated request",
            0xD0 => "SDR repository in update mode",
            0xD1 => "device firmware in update mode",
            0xD2 => "BMC initialization in progress",
            0xD3 => "destination unavailable",
            0xD4 => "insufficient privilege level",
            0xD5 => "command not supported in present state",
            0xD6 => "command sub-function disabled or unavailable",
            0xFF => "unspecified error",
            0x01..=0x7E | 0x80..=0xBE => "command specific error",
            _ => "reserved completion code",
        }
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.description(), self.raw())
    }
}

// sec 5.1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkFunctionRequestCode {
    Chassis,
    Bridge,
    Sensor,
    App,
    Firmware,
    Storage,
    Transport,
}

impl NetworkFunctionRequestCode {
    pub fn request(&self) -> u8 {
        match *self {
            NetworkFunctionRequestCode::Chassis => 0x00,
            NetworkFunctionRequestCode::Bridge => 0x02,
            NetworkFunctionRequestCode::Sensor => 0x04,
            NetworkFunctionRequestCode::App => 0x06,
            NetworkFunctionRequestCode::Firmware => 0x08,
            NetworkFunctionRequestCode::Storage => 0x0A,
            NetworkFunctionRequestCode::Transport => 0x0C,
        }
    }

    pub fn response(&self) -> u8 {
        self.request() | 0x01
    }
}

// sec 6.8
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivilegeLevel {
    None = 0x00,
    Callback = 0x01,
    User = 0x02,
    Operator = 0x03,
    Administrator = 0x04,
    Oem = 0x05,
}

impl TryFrom<u8> for PrivilegeLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0x0F {
            0 => Ok(PrivilegeLevel::None),
            1 => Ok(PrivilegeLevel::Callback),
            2 => Ok(PrivilegeLevel::User),
            3 => Ok(PrivilegeLevel::Operator),
            4 => Ok(PrivilegeLevel::Administrator),
            5 => Ok(PrivilegeLevel::Oem),
            _ => Err(value),
        }
    }
}

impl FromStr for PrivilegeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "callback" => Ok(PrivilegeLevel::Callback),
            "user" => Ok(PrivilegeLevel::User),
            "operator" => Ok(PrivilegeLevel::Operator),
            "admin" | "administrator" => Ok(PrivilegeLevel::Administrator),
            "oem" => Ok(PrivilegeLevel::Oem),
            _ => Err(s.to_string()),
        }
    }
}
