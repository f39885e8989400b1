use super::auth::{self, ChallengeTransform};
use super::bridge::{self, BridgeRoute, Unwrapped};
use super::command;
use super::pkt15;
use super::request::{self, Request};
use super::response::{AuthCapabilities, Response};
use super::{AuthType, CommandApp, PrivilegeLevel, MESSAGE_LEN_MAX};
use crate::config::{Config, PingPolicy};
use crate::error::{Error, ErrorKind};
use crate::rmcp::{self, Pong};
use crate::transport::{CancelToken, Link, Transport, TransportStats, UdpTransport};
use log::{debug, trace, warn};
use std::net::UdpSocket;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SockOpen,
    Bound,
    PingSent,
    PongReceived,
    ChallengeIssued,
    Active,
    Closed,
}

// Which frames of an active session carry an auth code (sec 22.13).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPolicy {
    PerMessage,
    UserLevel,
    None,
}

impl AuthPolicy {
    pub fn from_capabilities(caps: &AuthCapabilities) -> Self {
        if !caps.per_message_auth() {
            AuthPolicy::None
        } else if !caps.user_level_auth() {
            AuthPolicy::UserLevel
        } else {
            AuthPolicy::PerMessage
        }
    }

    pub fn signs(self, priv_level: PrivilegeLevel) -> bool {
        match self {
            AuthPolicy::PerMessage => true,
            AuthPolicy::UserLevel => priv_level > PrivilegeLevel::User,
            AuthPolicy::None => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Exchange {
    tries: u32,
    cancellable: bool,
    advances: bool,
}

/// IPMI v1.5 LAN session with one BMC.
///
/// A session is used by one caller at a time: sequence numbers and auth
/// codes are chained from one exchange to the next.
pub struct Session<T: Transport = UdpTransport> {
    config: Config,
    state: SessionState,
    link: Option<Link<T>>,
    cancel: CancelToken,
    username: [u8; 16],
    password: [u8; 16],
    auth_type: AuthType,
    policy: AuthPolicy,
    transform: ChallengeTransform,
    priv_level: PrivilegeLevel,
    privilege_error: Option<Error>,
    capabilities: Option<AuthCapabilities>,
    session_id: u32,
    out_seq: u32,
    in_seq: u32,
    rq_seq: u8,
}

impl Session<UdpTransport> {
    pub fn new(config: Config) -> Result<Self, Error> {
        Session::build(config, None, SessionState::Init)
    }

    pub fn connect(&mut self) -> Result<(), Error> {
        self.expect(SessionState::Init)?;

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::Bind)?;
        trace!("bound: {:?}", socket.local_addr());
        self.set_state(SessionState::SockOpen);

        let transport =
            UdpTransport::connect(socket, self.config.host(), self.config.remote_port())?;
        self.link = Some(Link::new(transport));
        self.set_state(SessionState::Bound);

        Ok(())
    }
}

impl<T: Transport> Session<T> {
    /// Session over an already connected transport, ready for [`Session::open`].
    pub fn with_transport(config: Config, transport: T) -> Result<Self, Error> {
        Session::build(config, Some(Link::new(transport)), SessionState::Bound)
    }

    fn build(config: Config, link: Option<Link<T>>, state: SessionState) -> Result<Self, Error> {
        config.validate()?;

        let username =
            auth::pad16(config.user().as_bytes()).ok_or(Error::InvalidUsernameLength)?;
        let password =
            auth::pad16(config.secret().as_bytes()).ok_or(Error::InvalidPasswordLength)?;

        Ok(Session {
            config,
            state,
            link,
            cancel: CancelToken::new(),
            username,
            password,
            auth_type: AuthType::None,
            policy: AuthPolicy::PerMessage,
            transform: ChallengeTransform::Standard,
            priv_level: PrivilegeLevel::User,
            privilege_error: None,
            capabilities: None,
            session_id: 0,
            out_seq: initial_seq(),
            in_seq: 0,
            rq_seq: 0,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn out_seq(&self) -> u32 {
        self.out_seq
    }

    pub fn in_seq(&self) -> u32 {
        self.in_seq
    }

    pub fn rq_seq(&self) -> u8 {
        self.rq_seq
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn auth_policy(&self) -> AuthPolicy {
        self.policy
    }

    pub fn privilege_level(&self) -> PrivilegeLevel {
        self.priv_level
    }

    /// Why the working privilege level could not be set, if it failed.
    pub fn privilege_error(&self) -> Option<&Error> {
        self.privilege_error.as_ref()
    }

    pub fn capabilities(&self) -> Option<&AuthCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn stats(&self) -> TransportStats {
        self.link.as_ref().map(|l| l.stats()).unwrap_or_default()
    }

    pub(crate) fn username(&self) -> &[u8; 16] {
        &self.username
    }

    // ASF sec 3.2.4.3
    pub fn ping(&mut self) -> Result<Pong, Error> {
        self.expect(SessionState::Bound)?;

        let tag = rand::random::<u8>();
        let timeout = self.config.budget().ping_timeout;
        let tries = self.config.budget().max_tries();
        let cancel = self.cancel.clone();
        self.set_state(SessionState::PingSent);

        let result = self
            .link()?
            .exchange(&rmcp::ping(tag), timeout, tries, Some(&cancel), |bytes| {
                match Pong::parse(bytes) {
                    Ok(Some(pong)) if pong.tag() == tag => Ok(Some(pong)),
                    Ok(_) => Ok(None),
                    Err(e) => {
                        warn!("ignored malformed pong: {}", e);
                        Ok(None)
                    }
                }
            });

        match result {
            Ok(pong) => {
                if !pong.ipmi_supported() {
                    warn!("pong does not advertise IPMI support");
                }
                self.set_state(SessionState::PongReceived);
                Ok(pong)
            }
            Err(e) => {
                self.set_state(SessionState::Bound);
                Err(e)
            }
        }
    }

    /// Runs the capabilities, challenge, activate and privilege exchanges.
    ///
    /// A failure to set the privilege level leaves the session active and is
    /// reported by [`Session::privilege_error`].
    pub fn open(&mut self) -> Result<(), Error> {
        self.expect(SessionState::Bound)?;

        match self.config.ping_policy() {
            PingPolicy::Skip => {}
            PingPolicy::Tolerate => {
                if let Err(e) = self.ping() {
                    if e.kind() == ErrorKind::Cancelled {
                        return Err(e);
                    }
                    warn!("ping failed, continuing: {}", e);
                }
            }
            PingPolicy::Require => {
                self.ping()?;
            }
        }

        match self.handshake() {
            Ok(()) => Ok(()),
            Err(Error::Cancelled) => {
                self.abort();
                Err(Error::Cancelled)
            }
            Err(e) => {
                debug!("session establishment failed: {}", e);
                self.session_id = 0;
                self.set_state(SessionState::Bound);
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<(), Error> {
        let caps = command::get_channel_authentication_cap(self)?;
        let auth_type = auth::negotiate(&caps, self.config.requested_auth_type())?;
        self.auth_type = auth_type;
        self.policy = AuthPolicy::from_capabilities(&caps);
        self.transform =
            ChallengeTransform::for_capabilities(&caps, self.config.xor_challenge_vendors());
        self.capabilities = Some(caps);

        let challenge = command::get_session_challenge(self, auth_type)?;
        self.session_id = challenge.session_id();
        self.set_state(SessionState::ChallengeIssued);

        let transformed = self.transform.apply(challenge.challenge(), &self.password);
        let initial_seq = self.out_seq;
        let activated = command::activate_session(self, &transformed, initial_seq)?;

        match activated.auth_type() {
            Ok(t) if t != self.auth_type => {
                debug!("BMC switched auth type to {:?}", t);
                self.auth_type = t;
            }
            _ => {}
        }
        self.session_id = activated.session_id();
        self.out_seq = nonzero(activated.inbound_seq());
        self.priv_level = PrivilegeLevel::User;
        self.set_state(SessionState::Active);
        debug!(
            "session {:#010x} active, auth {:?}, max privilege {:?}",
            self.session_id,
            self.auth_type,
            activated.max_priv_level()
        );

        let requested = self.config.requested_privilege();
        match command::set_privilege_level(self, requested) {
            Ok(level) => self.priv_level = level,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("failed to set privilege level {:?}: {}", requested, e);
                self.privilege_error = Some(e);
            }
        }

        Ok(())
    }

    /// Sends a request to the configured target, bridged when the target is
    /// not the BMC.
    pub fn command(&mut self, req: Request) -> Result<Response, Error> {
        let route = self.route(self.config.target_address(), self.config.target_channel());
        self.dispatch(req, route)
    }

    /// The completion code is returned as is in the response.
    pub fn raw_command(
        &mut self,
        netfn: u8,
        lun: u8,
        target_addr: u8,
        bus: u8,
        cmd: u8,
        data: &[u8],
    ) -> Result<Response, Error> {
        if data.len() > MESSAGE_LEN_MAX {
            return Err(Error::RequestTooLong(data.len()));
        }

        let data = if data.is_empty() {
            None
        } else {
            Some(data.to_vec())
        };
        let req = Request::raw(netfn, lun, cmd, data);
        let route = self.route(target_addr, bus);
        self.dispatch(req, route)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Active => {}
            actual => {
                return Err(Error::InvalidState {
                    expected: SessionState::Active,
                    actual,
                })
            }
        }

        let session_id = self.session_id;
        let result = command::close_session(self, session_id);

        // Never reuse a session the BMC may have dropped.
        self.session_id = 0;
        self.set_state(SessionState::Closed);

        result
    }

    /// Single try close that ignores cancellation; failures are only logged.
    pub fn abort(&mut self) {
        if self.state == SessionState::Active {
            let session_id = self.session_id;
            let route = BridgeRoute::direct(self.config.bmc_address());
            let opts = Exchange {
                tries: 1,
                cancellable: false,
                advances: true,
            };

            let req = request::close_session(session_id);
            match self.exchange(req, &route, opts).and_then(|res| res.ok()) {
                Ok(_) => debug!("session {:#010x} closed", session_id),
                Err(e) => warn!("failed to close session {:#010x}: {}", session_id, e),
            }
        }

        self.session_id = 0;
        self.set_state(SessionState::Closed);
    }

    // Session management exchange, always addressed to the BMC itself.
    pub(crate) fn session_command(&mut self, req: Request) -> Result<Response, Error> {
        let route = BridgeRoute::direct(self.config.bmc_address());
        let opts = Exchange {
            tries: self.config.budget().max_tries(),
            cancellable: true,
            advances: true,
        };
        self.exchange(req, &route, opts)
    }

    fn dispatch(&mut self, req: Request, route: BridgeRoute) -> Result<Response, Error> {
        self.expect(SessionState::Active)?;

        // A "Send Message" passed through as is does not join the sequence.
        let advances = !(route.depth() == 0 && req.is_send_message());
        let opts = Exchange {
            tries: self.config.budget().max_tries(),
            cancellable: true,
            advances,
        };

        match self.exchange(req, &route, opts) {
            Err(Error::Cancelled) => {
                warn!("command cancelled, closing session");
                self.abort();
                Err(Error::Cancelled)
            }
            result => result,
        }
    }

    fn exchange(
        &mut self,
        req: Request,
        route: &BridgeRoute,
        opts: Exchange,
    ) -> Result<Response, Error> {
        let seq = self.rq_seq;
        let cmd = req.cmd();
        let depth = route.depth();
        let frame_auth = self.frame_auth_type(cmd);

        let message = bridge::wrap(req.with_seq(seq), route);
        let frame = self.frame(frame_auth, message)?;

        let reject = self.config.rejects_unauthenticated_replies();
        let timeout = self.config.budget().timeout;
        let token = self.cancel.clone();
        let cancel = if opts.cancellable { Some(&token) } else { None };

        let (res, reply_seq) = self
            .link()?
            .exchange(&frame, timeout, opts.tries, cancel, |bytes| {
                accept(bytes, frame_auth, reject, depth, cmd, seq)
            })?;

        if self.state == SessionState::Active {
            self.in_seq = reply_seq;
        }

        if opts.advances {
            self.advance();
        }

        Ok(res)
    }

    fn frame_auth_type(&self, cmd: u8) -> AuthType {
        match self.state {
            SessionState::ChallengeIssued if cmd == CommandApp::ActivateSession as u8 => {
                self.auth_type
            }
            SessionState::Active if self.policy.signs(self.priv_level) => self.auth_type,
            _ => AuthType::None,
        }
    }

    fn frame(&self, auth_type: AuthType, message: Vec<u8>) -> Result<Vec<u8>, Error> {
        let seq = if self.state == SessionState::Active {
            self.out_seq
        } else {
            0
        };

        let auth_code = auth_type.auth_code(&self.password, self.session_id, &message, seq)?;
        let header = pkt15::Header::new(auth_type, seq, self.session_id, message.len())?
            .with_auth_code(auth_code);

        Ok(pkt15::Packet::new(header, message).encode())
    }

    fn advance(&mut self) {
        self.out_seq = next_seq(self.out_seq);
        self.rq_seq = (self.rq_seq + 1) & 0x3F;
    }

    fn route(&self, target_addr: u8, channel: u8) -> BridgeRoute {
        let route = BridgeRoute::new(self.config.bmc_address(), target_addr, channel);
        match self.config.transit_route() {
            Some((addr, channel)) => route.with_transit(addr, channel),
            None => route,
        }
    }

    fn link(&mut self) -> Result<&mut Link<T>, Error> {
        let actual = self.state;
        self.link.as_mut().ok_or(Error::InvalidState {
            expected: SessionState::Bound,
            actual,
        })
    }

    fn expect(&self, expected: SessionState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("session state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            debug!("session {:#010x} dropped while active", self.session_id);
            self.abort();
        }
    }
}

// Malformed datagrams are skipped and the wait goes on within the current try.
fn accept(
    bytes: &[u8],
    frame_auth: AuthType,
    reject_unauthenticated: bool,
    depth: u8,
    cmd: u8,
    seq: u8,
) -> Result<Option<(Response, u32)>, Error> {
    match match_reply(bytes, frame_auth, reject_unauthenticated, depth, cmd, seq) {
        Err(Error::UnauthenticatedReply) => Err(Error::UnauthenticatedReply),
        Err(e) => {
            warn!("ignored malformed reply ({} bytes): {}", bytes.len(), e);
            Ok(None)
        }
        result => result,
    }
}

fn match_reply(
    bytes: &[u8],
    frame_auth: AuthType,
    reject_unauthenticated: bool,
    depth: u8,
    cmd: u8,
    seq: u8,
) -> Result<Option<(Response, u32)>, Error> {
    let pkt = match pkt15::Packet::decode(bytes) {
        Err(Error::UnexpectedClass(class)) => {
            debug!("ignored RMCP class {:#04x}", class);
            return Ok(None);
        }
        result => result?,
    };

    if frame_auth != AuthType::None && !pkt.header().is_authenticated() {
        if reject_unauthenticated {
            return Err(Error::UnauthenticatedReply);
        }
        warn!("reply to command {:#04x} is not authenticated", cmd);
    }

    let res = Response::parse(pkt.payload())?;
    match bridge::unwrap_response(res, depth)? {
        Unwrapped::Ack => {
            debug!("bridged request acknowledged");
            Ok(None)
        }
        Unwrapped::Noise => {
            debug!("ignored unrelated reply");
            Ok(None)
        }
        Unwrapped::Answer(res) => {
            let refused = depth > 0 && res.cmd() == CommandApp::SendMessage as u8;
            if res.rq_seq() != seq || (res.cmd() != cmd && !refused) {
                debug!(
                    "ignored reply to command {:#04x} seq {}",
                    res.cmd(),
                    res.rq_seq()
                );
                return Ok(None);
            }
            Ok(Some((res, pkt.header().session_number())))
        }
    }
}

// Zero is never used as an outbound sequence number.
pub fn next_seq(seq: u32) -> u32 {
    nonzero(seq.wrapping_add(1))
}

fn nonzero(seq: u32) -> u32 {
    if seq == 0 {
        1
    } else {
        seq
    }
}

fn initial_seq() -> u32 {
    nonzero(rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::ipmi::auth::compute_auth_code;
    use crate::ipmi::CompletionCode;
    use crate::transport::mock::{MockTransport, Reply};
    use std::cell::RefCell;
    use std::convert::TryFrom;
    use std::io;
    use std::rc::Rc;
    use std::time::Duration;

    const SESSION_ID: u32 = 0x0A0B_0C0D;
    const TEMP_ID: u32 = 0x1111_2222;
    const INBOUND_SEQ: u32 = 0x100;
    const CHALLENGE: [u8; 16] = [0x42; 16];

    struct FakeBmc {
        caps: [u8; 8],
        password: [u8; 16],
        inbound_seq: u32,
        bridge_depth: u8,
        out_seq: u32,
        auth_type: AuthType,
        reject_extended: bool,
        challenge_code: u8,
        privilege_code: u8,
        close_code: u8,
        drop_auth: bool,
        pong: bool,
        requests: Vec<(pkt15::Header, Request)>,
        activate_challenge: Option<[u8; 16]>,
        bad_auth: u32,
        closed: bool,
    }

    impl FakeBmc {
        fn new(auth_types: u8, status: u8) -> Self {
            FakeBmc {
                caps: [0x01, auth_types, status, 0x00, 0x00, 0x00, 0x00, 0x00],
                password: auth::pad16(b"password").unwrap(),
                inbound_seq: INBOUND_SEQ,
                bridge_depth: 0,
                out_seq: 1,
                auth_type: AuthType::None,
                reject_extended: false,
                challenge_code: 0,
                privilege_code: 0,
                close_code: 0,
                drop_auth: false,
                pong: false,
                requests: vec![],
                activate_challenge: None,
                bad_auth: 0,
                closed: false,
            }
        }

        fn handle(&mut self, bytes: &[u8]) -> Vec<Reply> {
            if bytes[3] == 0x06 {
                return self.handle_ping(bytes[9]);
            }

            let pkt = pkt15::Packet::decode(bytes).unwrap();
            let header = pkt.header().clone();
            if header.is_authenticated() {
                let auth_type = AuthType::try_from(header.auth_type()).unwrap();
                let expected = compute_auth_code(
                    auth_type,
                    &self.password,
                    header.session_id(),
                    pkt.payload(),
                    header.session_number(),
                )
                .unwrap();
                if expected.as_ref() != header.auth_code() {
                    self.bad_auth += 1;
                }
            }

            let mut layers = vec![];
            let mut req = Request::try_from(pkt.payload()).unwrap();
            while req.is_send_message() && (layers.len() as u8) < self.bridge_depth {
                let inner = Request::try_from(&req.data()[1..]).unwrap();
                layers.push(req);
                req = inner;
            }

            let mut res = self.answer(&req);
            self.requests.push((header.clone(), req));

            let mut replies = vec![];
            if let Some(outer) = layers.first() {
                let ack = Response::reply(outer, CompletionCode::Completed, None);
                replies.push(Ok(self.reply(&header, ack)));
            }
            for layer in layers.iter().rev() {
                res = bridge::wrap_response(res, layer);
            }
            replies.push(Ok(self.reply(&header, res)));
            replies
        }

        fn handle_ping(&mut self, tag: u8) -> Vec<Reply> {
            if !self.pong {
                return vec![];
            }

            let mut bytes = vec![0x06, 0x00, 0xFF, 0x06, 0x00, 0x00, 0x11, 0xBE, 0x40, tag];
            bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x00, 0x11, 0xBE, 0x00, 0x00]);
            bytes.extend_from_slice(&[0x00, 0x00, 0x81, 0x00, 0x00, 0x00, 0x00, 0x00]);
            bytes.extend_from_slice(&[0x00, 0x00]);
            vec![Ok(bytes)]
        }

        fn answer(&mut self, req: &Request) -> Response {
            let (code, data) = match req.cmd() {
                0x38 if self.reject_extended && (req.data()[0] & 0x80) != 0 => (0xCC, None),
                0x38 => (0x00, Some(self.caps.to_vec())),
                0x39 => {
                    self.auth_type = AuthType::try_from(req.data()[0]).unwrap();
                    let mut data = TEMP_ID.to_le_bytes().to_vec();
                    data.extend_from_slice(&CHALLENGE);
                    (self.challenge_code, Some(data))
                }
                0x3A => {
                    let mut challenge = [0u8; 16];
                    challenge.copy_from_slice(&req.data()[2..18]);
                    self.activate_challenge = Some(challenge);

                    let mut data = vec![self.auth_type as u8];
                    data.extend_from_slice(&SESSION_ID.to_le_bytes());
                    data.extend_from_slice(&self.inbound_seq.to_le_bytes());
                    data.push(0x04);
                    (0x00, Some(data))
                }
                0x3B => (self.privilege_code, Some(vec![req.data()[0]])),
                0x3C => {
                    self.closed = true;
                    (self.close_code, None)
                }
                _ => (0x00, Some(vec![0x11, 0x22])),
            };

            Response::reply(req, CompletionCode::from(code), data)
        }

        fn reply(&mut self, req_header: &pkt15::Header, res: Response) -> Vec<u8> {
            let msg: Vec<u8> = res.into();
            let auth_type = if self.drop_auth {
                AuthType::None
            } else {
                AuthType::try_from(req_header.auth_type()).unwrap()
            };
            let session_id = req_header.session_id();
            let code =
                compute_auth_code(auth_type, &self.password, session_id, &msg, self.out_seq)
                    .unwrap();
            let header = pkt15::Header::new(auth_type, self.out_seq, session_id, msg.len())
                .unwrap()
                .with_auth_code(code);
            self.out_seq += 1;
            pkt15::Packet::new(header, msg).encode()
        }

        fn commands(&self) -> Vec<u8> {
            self.requests.iter().map(|(_, r)| r.cmd()).collect()
        }

        fn request(&self, cmd: u8) -> &(pkt15::Header, Request) {
            self.requests.iter().find(|(_, r)| r.cmd() == cmd).unwrap()
        }
    }

    type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

    fn config() -> Config {
        Config::new("bmc")
            .username("admin")
            .password("password")
            .timeout(Duration::from_millis(20))
            .ping_timeout(Duration::from_millis(20))
            .retries(2)
    }

    fn session(config: Config, bmc: &Rc<RefCell<FakeBmc>>) -> (Session<MockTransport>, Sent) {
        let fake = bmc.clone();
        let transport = MockTransport::new(move |bytes| fake.borrow_mut().handle(bytes));
        let sent = transport.sent();
        (Session::with_transport(config, transport).unwrap(), sent)
    }

    fn fake(auth_types: u8, status: u8) -> Rc<RefCell<FakeBmc>> {
        Rc::new(RefCell::new(FakeBmc::new(auth_types, status)))
    }

    #[test]
    fn open_selects_md5() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
        assert_eq!(AuthType::MD5, session.auth_type());
        assert_eq!(SESSION_ID, session.session_id());
        assert_eq!(PrivilegeLevel::Administrator, session.privilege_level());
        assert!(session.privilege_error().is_none());

        let bmc = bmc.borrow();
        assert_eq!(vec![0x38, 0x39, 0x3A, 0x3B], bmc.commands());
        assert_eq!(0, bmc.bad_auth);

        let (header, _) = bmc.request(0x38);
        assert_eq!(AuthType::None as u8, header.auth_type());
        let (header, _) = bmc.request(0x39);
        assert_eq!(AuthType::None as u8, header.auth_type());
        let (header, req) = bmc.request(0x3A);
        assert_eq!(AuthType::MD5 as u8, header.auth_type());
        assert_eq!(TEMP_ID, header.session_id());
        assert_eq!(0, header.session_number());
        assert_eq!(&CHALLENGE[..], &req.data()[2..18]);
        let (header, _) = bmc.request(0x3B);
        assert_eq!(AuthType::MD5 as u8, header.auth_type());
        assert_eq!(SESSION_ID, header.session_id());
        assert_eq!(INBOUND_SEQ, header.session_number());
    }

    #[test]
    fn open_selects_password() {
        let bmc = fake(0x10, 0x04);
        let (mut session, _) = session(config(), &bmc);

        session.open().unwrap();
        assert_eq!(AuthType::Password, session.auth_type());

        let bmc = bmc.borrow();
        let (header, _) = bmc.request(0x3A);
        assert_eq!(Some(&auth::pad16(b"password").unwrap()), header.auth_code());
        let (header, _) = bmc.request(0x3B);
        assert_eq!(Some(&auth::pad16(b"password").unwrap()), header.auth_code());
    }

    #[test]
    fn open_wrong_protocol_version() {
        let bmc = fake(0x84, 0x04);
        bmc.borrow_mut().caps[3] = 0x02;
        let (mut session, _) = session(config(), &bmc);

        match session.open() {
            Err(Error::WrongProtocolVersion) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Bound, session.state());
        assert_eq!(vec![0x38], bmc.borrow().commands());
    }

    #[test]
    fn open_spurious_refused() {
        let bmc = fake(0x07, 0x04);
        let fake_bmc = bmc.clone();
        let mut first = true;
        let transport = MockTransport::new(move |bytes| {
            let mut replies = fake_bmc.borrow_mut().handle(bytes);
            if first {
                first = false;
                replies.insert(0, Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
            }
            replies
        });
        let mut session = Session::with_transport(config(), transport).unwrap();

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
        assert_eq!(1, session.stats().receive_retries);
        assert_eq!(4, session.stats().sends);
    }

    #[test]
    fn open_skips_short_datagram() {
        let bmc = fake(0x07, 0x04);
        let fake_bmc = bmc.clone();
        let mut first = true;
        let transport = MockTransport::new(move |bytes| {
            let mut replies = fake_bmc.borrow_mut().handle(bytes);
            if first {
                first = false;
                replies.insert(0, Ok(vec![0x06, 0x00, 0xFF, 0x07, 0x00, 0x00]));
            }
            replies
        });
        let mut session = Session::with_transport(config(), transport).unwrap();

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
        assert_eq!(4, session.stats().sends);
        assert_eq!(0, session.stats().timeouts);
    }

    #[test]
    fn accept_skips_corrupted_checksum() {
        let req = Request::raw(0x06, 0, 0x01, None);
        let frame = |corrupt: bool| {
            let mut msg: Vec<u8> =
                Response::reply(&req, CompletionCode::Completed, Some(vec![0x20])).into();
            if corrupt {
                msg[2] ^= 0xFF;
            }
            let header = pkt15::Header::new(AuthType::None, 5, 0, msg.len()).unwrap();
            pkt15::Packet::new(header, msg).encode()
        };

        let corrupted = accept(&frame(true), AuthType::None, false, 0, 0x01, req.seq()).unwrap();
        assert!(corrupted.is_none());

        let (res, seq) = accept(&frame(false), AuthType::None, false, 0, 0x01, req.seq())
            .unwrap()
            .unwrap();
        assert_eq!(&[0x20], res.data());
        assert_eq!(5, seq);
    }

    #[test]
    fn accept_unauthenticated_reply_rejected() {
        let req = Request::raw(0x06, 0, 0x01, None);
        let msg: Vec<u8> = Response::reply(&req, CompletionCode::Completed, None).into();
        let header = pkt15::Header::new(AuthType::None, 5, 0, msg.len()).unwrap();
        let bytes = pkt15::Packet::new(header, msg).encode();

        match accept(&bytes, AuthType::MD5, true, 0, 0x01, req.seq()) {
            Err(Error::UnauthenticatedReply) => {}
            _ => panic!(),
        }
    }

    #[test]
    fn ping_skips_truncated_pong() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().pong = true;
        let fake_bmc = bmc.clone();
        let transport = MockTransport::new(move |bytes| {
            let mut replies = fake_bmc.borrow_mut().handle(bytes);
            replies.insert(0, Ok(vec![0x06, 0x00, 0xFF, 0x06, 0x00, 0x00]));
            replies
        });
        let mut session = Session::with_transport(config(), transport).unwrap();

        session.ping().unwrap();
        assert_eq!(SessionState::PongReceived, session.state());
        assert_eq!(1, session.stats().sends);
    }

    #[test]
    fn raw_command_bridged() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().bridge_depth = 1;
        let (mut session, sent) = session(config().target(0x72, 7), &bmc);
        session.open().unwrap();
        let handshake = sent.borrow().len();

        let res = session.raw_command(0x04, 0, 0x72, 7, 0x2D, &[0x30]).unwrap();
        assert_eq!(0x2D, res.cmd());
        assert_eq!(CompletionCode::Completed, res.code());
        assert_eq!(&[0x11, 0x22][..], res.data());

        let res = command::get_device_id(&mut session).unwrap();
        assert_eq!(0x01, res.cmd());

        for frame in &sent.borrow()[handshake..] {
            let pkt = pkt15::Packet::decode(frame).unwrap();
            let outer = Request::try_from(pkt.payload()).unwrap();
            assert!(outer.is_send_message());
            assert_eq!(0x47, outer.data()[0]);
            let inner = bridge::unwrap_request(pkt.payload(), 1).unwrap();
            assert_eq!(0x72, inner.rs_addr());
        }
        assert_eq!(handshake + 2, sent.borrow().len());
        assert_eq!(0, bmc.borrow().bad_auth);
    }

    #[test]
    fn sequence_numbers_advance() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();
        assert_eq!(INBOUND_SEQ + 1, session.out_seq());

        for _ in 0..3 {
            session.raw_command(0x06, 0, 0x20, 0, 0x01, &[]).unwrap();
        }
        assert_eq!(INBOUND_SEQ + 4, session.out_seq());
        assert_eq!(7, session.rq_seq());

        let bmc = bmc.borrow();
        let seqs: Vec<u32> = bmc
            .requests
            .iter()
            .skip(3)
            .map(|(h, _)| h.session_number())
            .collect();
        assert_eq!(
            vec![INBOUND_SEQ, INBOUND_SEQ + 1, INBOUND_SEQ + 2, INBOUND_SEQ + 3],
            seqs
        );
        let rq_seqs: Vec<u8> = bmc.requests.iter().map(|(_, r)| r.seq()).collect();
        assert_eq!(vec![0, 1, 2, 3, 4, 5, 6], rq_seqs);
    }

    #[test]
    fn sequence_zero_inbound() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().inbound_seq = 0;
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        let (header, _) = bmc.borrow().request(0x3B).clone();
        assert_eq!(1, header.session_number());
        assert_eq!(2, session.out_seq());
    }

    #[test]
    fn next_seq_wraps() {
        assert_eq!(6, next_seq(5));
        assert_eq!(1, next_seq(u32::MAX));
        assert_eq!(1, next_seq(0));
    }

    #[test]
    fn raw_send_message_not_sequenced() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();
        let out_seq = session.out_seq();
        let rq_seq = session.rq_seq();

        let inner: Vec<u8> = request::get_device_id().with_target(0x72).into();
        let mut data = vec![0x47];
        data.extend_from_slice(&inner);
        let res = session.raw_command(0x06, 0, 0x20, 0, 0x34, &data).unwrap();
        assert_eq!(0x34, res.cmd());
        assert_eq!(out_seq, session.out_seq());
        assert_eq!(rq_seq, session.rq_seq());
    }

    #[test]
    fn raw_command_too_long() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        match session.raw_command(0x06, 0, 0x20, 0, 0x01, &[0u8; 256]) {
            Err(Error::RequestTooLong(256)) => {}
            _ => panic!(),
        }
    }

    #[test]
    fn raw_command_not_active() {
        let bmc = fake(0x07, 0x04);
        let (mut session, sent) = session(config(), &bmc);

        match session.raw_command(0x06, 0, 0x20, 0, 0x01, &[]) {
            Err(Error::InvalidState {
                expected: SessionState::Active,
                actual: SessionState::Bound,
            }) => {}
            _ => panic!(),
        }
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn raw_command_completion_code_verbatim() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        // Close Session answered with a session specific code.
        bmc.borrow_mut().close_code = 0x87;
        let res = session
            .raw_command(0x06, 0, 0x20, 0, 0x3C, &SESSION_ID.to_le_bytes())
            .unwrap();
        assert_eq!(CompletionCode::Error(0x87), res.code());
    }

    #[test]
    fn close_zeroes_session_id() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        session.close().unwrap();
        assert_eq!(SessionState::Closed, session.state());
        assert_eq!(0, session.session_id());
        assert!(bmc.borrow().closed);

        let (header, req) = bmc.borrow().request(0x3C).clone();
        assert_eq!(AuthType::MD5 as u8, header.auth_type());
        assert_eq!(&SESSION_ID.to_le_bytes()[..], req.data());

        session.close().unwrap();
    }

    #[test]
    fn close_failure_zeroes_session_id() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().close_code = 0x87;
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        match session.close() {
            Err(Error::Session(SessionError::InvalidSessionId)) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Closed, session.state());
        assert_eq!(0, session.session_id());
    }

    #[test]
    fn open_invalid_username() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().challenge_code = 0x81;
        let (mut session, _) = session(config(), &bmc);

        match session.open() {
            Err(Error::Session(SessionError::InvalidUsername)) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Bound, session.state());
        assert_eq!(vec![0x38, 0x39], bmc.borrow().commands());
    }

    #[test]
    fn open_privilege_failure_is_reported() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().privilege_code = 0x81;
        let (mut session, _) = session(config(), &bmc);

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
        assert_eq!(PrivilegeLevel::User, session.privilege_level());
        match session.privilege_error() {
            Some(Error::Session(SessionError::PrivilegeExceedsLimit)) => {}
            _ => panic!(),
        }
    }

    #[test]
    fn open_capabilities_fallback() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().reject_extended = true;
        let (mut session, _) = session(config(), &bmc);

        session.open().unwrap();
        let bmc = bmc.borrow();
        assert_eq!(vec![0x38, 0x38, 0x39, 0x3A, 0x3B], bmc.commands());
        assert_eq!(0x8E, bmc.requests[0].1.data()[0]);
        assert_eq!(0x0E, bmc.requests[1].1.data()[0]);
    }

    #[test]
    fn open_pinned_auth_type() {
        let bmc = fake(0x17, 0x04);
        let (mut session, _) = session(config().auth_type(AuthType::MD2), &bmc);

        session.open().unwrap();
        assert_eq!(AuthType::MD2, session.auth_type());
        assert_eq!(0, bmc.borrow().bad_auth);
    }

    #[test]
    fn per_message_auth_disabled() {
        let bmc = fake(0x07, 0x14);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();
        assert_eq!(AuthPolicy::None, session.auth_policy());

        session.raw_command(0x06, 0, 0x20, 0, 0x01, &[]).unwrap();
        assert_eq!(AuthType::MD5, session.auth_type());

        let bmc = bmc.borrow();
        let (header, _) = bmc.request(0x3A);
        assert_eq!(AuthType::MD5 as u8, header.auth_type());
        let (header, _) = bmc.request(0x01);
        assert_eq!(AuthType::None as u8, header.auth_type());
    }

    #[test]
    fn user_level_auth_disabled() {
        let bmc = fake(0x07, 0x0C);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();
        assert_eq!(AuthPolicy::UserLevel, session.auth_policy());

        session.raw_command(0x06, 0, 0x20, 0, 0x01, &[]).unwrap();

        // Set Session Privilege Level runs at User, later commands at Administrator.
        let bmc = bmc.borrow();
        let (header, _) = bmc.request(0x3B);
        assert_eq!(AuthType::None as u8, header.auth_type());
        let (header, _) = bmc.request(0x01);
        assert_eq!(AuthType::MD5 as u8, header.auth_type());
    }

    #[test]
    fn unauthenticated_reply_tolerated() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().drop_auth = true;
        let (mut session, _) = session(config(), &bmc);

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
    }

    #[test]
    fn unauthenticated_reply_rejected() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().drop_auth = true;
        let (mut session, _) = session(config().reject_unauthenticated_replies(true), &bmc);

        match session.open() {
            Err(Error::UnauthenticatedReply) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Bound, session.state());
    }

    #[test]
    fn xor_challenge_vendor() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().caps[4..7].copy_from_slice(&[0x57, 0x01, 0x00]);
        let (mut session, _) = session(config().xor_challenge_vendor(343), &bmc);

        session.open().unwrap();
        let expected = ChallengeTransform::XorPasswordDigest
            .apply(&CHALLENGE, &auth::pad16(b"password").unwrap());
        assert_eq!(Some(expected), bmc.borrow().activate_challenge);
        assert_ne!(Some(CHALLENGE), bmc.borrow().activate_challenge);
    }

    #[test]
    fn cancelled_command_closes_session() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config(), &bmc);
        session.open().unwrap();

        session.cancel_token().cancel();
        match session.raw_command(0x06, 0, 0x20, 0, 0x01, &[]) {
            Err(Error::Cancelled) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Closed, session.state());
        assert_eq!(0, session.session_id());
        assert!(bmc.borrow().closed);
        assert!(!bmc.borrow().commands().contains(&0x01));
    }

    #[test]
    fn drop_closes_session() {
        let bmc = fake(0x07, 0x04);
        {
            let (mut session, _) = session(config(), &bmc);
            session.open().unwrap();
        }
        assert!(bmc.borrow().closed);
    }

    #[test]
    fn ping_required() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().pong = true;
        let (mut session, _) = session(config().ping(PingPolicy::Require), &bmc);

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
    }

    #[test]
    fn ping_required_no_pong() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config().ping(PingPolicy::Require), &bmc);

        match session.open() {
            Err(Error::NoResponse(2)) => {}
            _ => panic!(),
        }
        assert_eq!(SessionState::Bound, session.state());
        assert!(bmc.borrow().requests.is_empty());
    }

    #[test]
    fn ping_tolerated_no_pong() {
        let bmc = fake(0x07, 0x04);
        let (mut session, _) = session(config().ping(PingPolicy::Tolerate), &bmc);

        session.open().unwrap();
        assert_eq!(SessionState::Active, session.state());
    }

    #[test]
    fn ping_pong() {
        let bmc = fake(0x07, 0x04);
        bmc.borrow_mut().pong = true;
        let (mut session, _) = session(config(), &bmc);

        let pong = session.ping().unwrap();
        assert!(pong.ipmi_supported());
        assert_eq!(SessionState::PongReceived, session.state());
    }

    #[test]
    fn session_rejects_long_password() {
        let transport = MockTransport::silent();
        match Session::with_transport(config().password("p".repeat(17)), transport) {
            Err(Error::InvalidPasswordLength) => {}
            _ => panic!(),
        }
    }
}
