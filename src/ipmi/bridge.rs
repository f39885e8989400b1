use super::request::{self, Request};
use super::response::Response;
use super::{CommandApp, CompletionCode, NetworkFunctionRequestCode, REMOTE_SWID};
use crate::error::Error;
use std::convert::TryFrom;

// Target of one command, derived from the addresses given by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeRoute {
    bmc_addr: u8,
    target_addr: u8,
    target_channel: u8,
    transit_addr: Option<u8>,
    transit_channel: u8,
}

// One "Send Message" envelope, listed from the innermost outwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layer {
    rs_addr: u8,
    rq_addr: u8,
    channel: u8,
}

impl BridgeRoute {
    pub fn direct(bmc_addr: u8) -> Self {
        BridgeRoute {
            bmc_addr,
            target_addr: bmc_addr,
            target_channel: 0,
            transit_addr: None,
            transit_channel: 0,
        }
    }

    pub fn new(bmc_addr: u8, target_addr: u8, target_channel: u8) -> Self {
        BridgeRoute {
            bmc_addr,
            target_addr,
            target_channel,
            transit_addr: None,
            transit_channel: 0,
        }
    }

    pub fn with_transit(mut self, transit_addr: u8, transit_channel: u8) -> Self {
        self.transit_addr = Some(transit_addr);
        self.transit_channel = transit_channel;
        self
    }

    pub fn target_addr(&self) -> u8 {
        self.target_addr
    }

    pub fn depth(&self) -> u8 {
        if self.target_addr == self.bmc_addr {
            return 0;
        }

        match self.transit_addr {
            Some(addr) if addr != self.bmc_addr => 2,
            _ => 1,
        }
    }

    fn layers(&self) -> Vec<Layer> {
        match (self.depth(), self.transit_addr) {
            (2, Some(transit_addr)) => vec![
                Layer {
                    rs_addr: transit_addr,
                    rq_addr: self.bmc_addr,
                    channel: self.target_channel,
                },
                Layer {
                    rs_addr: self.bmc_addr,
                    rq_addr: REMOTE_SWID,
                    channel: self.transit_channel,
                },
            ],
            (1, _) => vec![Layer {
                rs_addr: self.bmc_addr,
                rq_addr: REMOTE_SWID,
                channel: self.target_channel,
            }],
            _ => vec![],
        }
    }
}

// sec 6.13
pub fn wrap(req: Request, route: &BridgeRoute) -> Vec<u8> {
    let seq = req.seq();
    let layers = route.layers();

    let mut req = req.with_target(route.target_addr);
    if !layers.is_empty() {
        req = req.with_requester(route.bmc_addr);
    }

    let mut bytes: Vec<u8> = req.into();
    for layer in layers {
        bytes = request::send_message(layer.channel, bytes)
            .with_target(layer.rs_addr)
            .with_requester(layer.rq_addr)
            .with_seq(seq)
            .into();
    }

    bytes
}

// Strips `depth` "Send Message" request envelopes, as the bridging
// controllers do.
pub fn unwrap_request(bytes: &[u8], depth: u8) -> Result<Request, Error> {
    let mut req = Request::try_from(bytes)?;
    for _ in 0..depth {
        if !req.is_send_message() || req.data().is_empty() {
            return Err(Error::InvalidPacketLength);
        }
        req = Request::try_from(&req.data()[1..])?;
    }

    Ok(req)
}

#[derive(Debug, PartialEq)]
pub enum Unwrapped {
    Answer(Response),
    // Empty "Send Message" acknowledgement, the answer is still to come.
    Ack,
    // Not a response to a bridged request.
    Noise,
}

pub fn unwrap_response(res: Response, depth: u8) -> Result<Unwrapped, Error> {
    let mut res = res;
    let mut remaining = depth;
    while remaining > 0 {
        if res.netfn() != NetworkFunctionRequestCode::App.response()
            || res.cmd() != CommandApp::SendMessage as u8
        {
            return Ok(Unwrapped::Noise);
        }

        // The bridging controller refused the request.
        if res.code() != CompletionCode::Completed {
            return Ok(Unwrapped::Answer(res));
        }

        if res.data().is_empty() {
            return Ok(Unwrapped::Ack);
        }

        res = Response::parse(res.data())?;
        remaining -= 1;
    }

    Ok(Unwrapped::Answer(res))
}

// Builds the reply a bridging controller sends back around `inner`.
pub fn wrap_response(inner: Response, req: &Request) -> Response {
    Response::reply(req, CompletionCode::Completed, Some(inner.into()))
}
