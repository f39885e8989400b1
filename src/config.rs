use crate::error::Error;
use crate::ipmi::{AuthType, PrivilegeLevel, BMC_SLAVE_ADDR, RMCP_PORT};
use std::time::Duration;

const FIELD_LEN_MAX: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    pub timeout: Duration,
    pub retries: u32,
    pub ping_timeout: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        RetryBudget {
            timeout: Duration::from_secs(2),
            retries: 3,
            ping_timeout: Duration::from_secs(1),
        }
    }
}

impl RetryBudget {
    // At least one send is always made.
    pub fn max_tries(&self) -> u32 {
        self.retries.max(1)
    }
}

// Whether the session handshake starts with an RMCP ping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingPolicy {
    Skip,
    Tolerate,
    Require,
}

impl Default for PingPolicy {
    fn default() -> Self {
        PingPolicy::Skip
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    host: String,
    port: u16,
    username: String,
    password: String,
    auth_type: Option<AuthType>,
    priv_level: PrivilegeLevel,
    budget: RetryBudget,
    ping: PingPolicy,
    reject_unauthenticated_replies: bool,
    bmc_addr: u8,
    target_addr: Option<u8>,
    target_channel: u8,
    transit: Option<(u8, u8)>,
    xor_challenge_vendors: Vec<u32>,
}

impl Config {
    pub fn new(host: impl Into<String>) -> Self {
        Config {
            host: host.into(),
            port: RMCP_PORT,
            username: String::new(),
            password: String::new(),
            auth_type: None,
            priv_level: PrivilegeLevel::Administrator,
            budget: RetryBudget::default(),
            ping: PingPolicy::default(),
            reject_unauthenticated_replies: false,
            bmc_addr: BMC_SLAVE_ADDR,
            target_addr: None,
            target_channel: 0,
            transit: None,
            xor_challenge_vendors: vec![],
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    // Pins the authentication type instead of negotiating the strongest one.
    pub fn auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    pub fn privilege_level(mut self, priv_level: PrivilegeLevel) -> Self {
        self.priv_level = priv_level;
        self
    }

    pub fn retry_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.budget.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.budget.retries = retries;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.budget.ping_timeout = timeout;
        self
    }

    pub fn ping(mut self, ping: PingPolicy) -> Self {
        self.ping = ping;
        self
    }

    pub fn reject_unauthenticated_replies(mut self, reject: bool) -> Self {
        self.reject_unauthenticated_replies = reject;
        self
    }

    pub fn bmc_addr(mut self, addr: u8) -> Self {
        self.bmc_addr = addr;
        self
    }

    pub fn target(mut self, addr: u8, channel: u8) -> Self {
        self.target_addr = Some(addr);
        self.target_channel = channel;
        self
    }

    pub fn transit(mut self, addr: u8, channel: u8) -> Self {
        self.transit = Some((addr, channel));
        self
    }

    /// BMCs whose capability response reports this OEM IANA number get the
    /// password digest challenge. The detected number is logged at debug
    /// level when a session opens.
    pub fn xor_challenge_vendor(mut self, iana: u32) -> Self {
        self.xor_challenge_vendors.push(iana);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.password
    }

    pub fn requested_auth_type(&self) -> Option<AuthType> {
        self.auth_type
    }

    pub fn requested_privilege(&self) -> PrivilegeLevel {
        self.priv_level
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn ping_policy(&self) -> PingPolicy {
        self.ping
    }

    pub fn rejects_unauthenticated_replies(&self) -> bool {
        self.reject_unauthenticated_replies
    }

    pub fn bmc_address(&self) -> u8 {
        self.bmc_addr
    }

    pub fn target_address(&self) -> u8 {
        self.target_addr.unwrap_or(self.bmc_addr)
    }

    pub fn target_channel(&self) -> u8 {
        self.target_channel
    }

    pub fn transit_route(&self) -> Option<(u8, u8)> {
        self.transit
    }

    pub fn xor_challenge_vendors(&self) -> &[u32] {
        &self.xor_challenge_vendors
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.username.len() > FIELD_LEN_MAX {
            return Err(Error::InvalidUsernameLength);
        }

        if self.password.len() > FIELD_LEN_MAX {
            return Err(Error::InvalidPasswordLength);
        }

        Ok(())
    }
}
