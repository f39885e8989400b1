pub mod auth;
pub mod bridge;
pub mod command;
mod constants;
pub mod pkt15;
pub mod request;
pub mod response;
mod session;

pub use constants::{
    AuthType, ChassisPowerState, CommandApp, CommandChassis, CompletionCode,
    NetworkFunctionRequestCode, PrivilegeLevel, BMC_SLAVE_ADDR, CHANNEL_CURRENT, MESSAGE_LEN_MAX,
    REMOTE_SWID, RMCP_PORT,
};
pub use session::{next_seq, AuthPolicy, Session, SessionState};
