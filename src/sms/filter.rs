//! Decision pipeline for outgoing and inbound short messages.
//!
//! Structurally the same machine as the voicecall chain, with one twist:
//! filters may rewrite the message in flight. Handlers receive the payload
//! mutably and whatever they leave behind is what the next filter, and
//! finally the dispatcher, sees. A suspended filter rewrites through
//! [`FilterChain::send_text_mut`] and friends before resuming.

use core::num::NonZeroU32;

use heapless::{Deque, Vec};

use super::{Datagram, OutgoingText, Scts, SmsAddress, StorageUuid, TextMessage};
use crate::filter::{FilterAction, FilterMeta, FilterRegistry, PendingId, RequestToken};

/// Default number of in-flight requests per chain.
pub const MAX_REQUESTS: usize = 4;
/// Default registry capacity.
pub const MAX_FILTERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SmsDecision {
    /// Hand the (possibly rewritten) message to the next filter or to the
    /// dispatcher.
    Continue,
    /// Swallow the message.
    Drop,
}

/// An SMS decision filter. Handlers a filter does not implement return
/// `None` and are skipped. A filter returning [`FilterAction::Pending`] must
/// later resume the request exactly once and honor `cancel` for the id it
/// returned.
pub trait SmsFilter: FilterMeta {
    fn filter_send_text(
        &self,
        token: RequestToken,
        msg: &mut OutgoingText,
    ) -> Option<FilterAction<SmsDecision>> {
        let _ = (token, msg);
        None
    }

    fn filter_recv_text(
        &self,
        token: RequestToken,
        msg: &mut TextMessage,
    ) -> Option<FilterAction<SmsDecision>> {
        let _ = (token, msg);
        None
    }

    fn filter_recv_datagram(
        &self,
        token: RequestToken,
        dg: &mut Datagram,
    ) -> Option<FilterAction<SmsDecision>> {
        let _ = (token, dg);
        None
    }

    fn cancel(&self, pending: PendingId) {
        let _ = pending;
    }
}

/// Chain owner callbacks. The dispatch methods run iff the chain completes
/// with [`SmsDecision::Continue`]; a host that has no dispatcher for a kind
/// simply leaves the default no-op in place. `destroyed` always runs last,
/// exactly once per request.
pub trait SmsFilterEvents {
    /// An outgoing text passed every filter; transmit it.
    fn send_text(&mut self, token: RequestToken, msg: &OutgoingText) {
        let _ = (token, msg);
    }

    /// An inbound text passed every filter; deliver it.
    fn deliver_text(&mut self, token: RequestToken, msg: &TextMessage) {
        let _ = (token, msg);
    }

    /// An inbound datagram passed every filter; deliver it.
    fn deliver_datagram(&mut self, token: RequestToken, dg: &Datagram) {
        let _ = (token, dg);
    }

    fn destroyed(&mut self, token: RequestToken);
}

#[derive(Debug)]
enum Body {
    Send(OutgoingText),
    RecvText(TextMessage),
    RecvDatagram(Datagram),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqState {
    Queued,
    Pending(PendingId),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Run,
    Advance,
    Finish(SmsDecision),
}

#[derive(Debug)]
struct Request {
    token: RequestToken,
    body: Body,
    cursor: usize,
    state: ReqState,
}

/// One filter chain per SMS session. Dropping the chain forgets in-flight
/// requests silently; call [`FilterChain::cancel_all`] first when destroy
/// notifications matter.
pub struct FilterChain<'r, const N: usize = { MAX_REQUESTS }, const R: usize = { MAX_FILTERS }> {
    registry: &'r FilterRegistry<dyn SmsFilter, R>,
    requests: Vec<Request, N>,
    steps: Deque<(RequestToken, Step), N>,
    next_token: u32,
}

impl<'r, const N: usize, const R: usize> FilterChain<'r, N, R> {
    pub fn new(registry: &'r FilterRegistry<dyn SmsFilter, R>) -> Self {
        Self {
            registry,
            requests: Vec::new(),
            steps: Deque::new(),
            next_token: 0,
        }
    }

    pub fn submit_send_text<E: SmsFilterEvents>(
        &mut self,
        addr: &SmsAddress,
        text: &str,
        events: &mut E,
    ) -> RequestToken {
        let mut msg = OutgoingText {
            addr: addr.clone(),
            ..Default::default()
        };
        if msg.text.push_str(text).is_err() {
            warn!("outgoing text truncated to capacity");
        }
        self.submit(Body::Send(msg), events)
    }

    pub fn submit_recv_text<E: SmsFilterEvents>(
        &mut self,
        msg: TextMessage,
        events: &mut E,
    ) -> RequestToken {
        self.submit(Body::RecvText(msg), events)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_recv_datagram<E: SmsFilterEvents>(
        &mut self,
        uuid: StorageUuid,
        dst_port: u16,
        src_port: u16,
        data: &[u8],
        addr: &SmsAddress,
        scts: Scts,
        events: &mut E,
    ) -> RequestToken {
        let mut dg = Datagram {
            uuid,
            dst_port,
            src_port,
            addr: addr.clone(),
            scts,
            ..Default::default()
        };
        if dg.data.extend_from_slice(data).is_err() {
            warn!("datagram truncated to capacity");
        }
        self.submit(Body::RecvDatagram(dg), events)
    }

    /// Continuation entry point for a filter that suspended a request.
    pub fn resume<E: SmsFilterEvents>(
        &mut self,
        token: RequestToken,
        decision: SmsDecision,
        events: &mut E,
    ) {
        let Some(idx) = self.index_of(token) else {
            // Late resume for a cancelled or completed request.
            return;
        };

        let req = &mut self.requests[idx];
        if !matches!(req.state, ReqState::Pending(_)) {
            warn!("resume for a request that is not suspended");
            return;
        }
        req.state = ReqState::Queued;

        let step = match decision {
            SmsDecision::Continue => Step::Advance,
            SmsDecision::Drop => Step::Finish(SmsDecision::Drop),
        };
        self.steps.push_back((token, step)).ok();
        self.pump(events);
    }

    /// Rewrite access for a suspended outgoing text. `None` when the token
    /// is gone or names a different kind.
    pub fn send_text_mut(&mut self, token: RequestToken) -> Option<&mut OutgoingText> {
        let idx = self.index_of(token)?;
        match &mut self.requests[idx].body {
            Body::Send(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn recv_text_mut(&mut self, token: RequestToken) -> Option<&mut TextMessage> {
        let idx = self.index_of(token)?;
        match &mut self.requests[idx].body {
            Body::RecvText(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn recv_datagram_mut(&mut self, token: RequestToken) -> Option<&mut Datagram> {
        let idx = self.index_of(token)?;
        match &mut self.requests[idx].body {
            Body::RecvDatagram(dg) => Some(dg),
            _ => None,
        }
    }

    /// Cancel every request in flight. Destroy callbacks run; dispatchers do
    /// not. Cancelling twice is a no-op.
    pub fn cancel_all<E: SmsFilterEvents>(&mut self, events: &mut E) {
        while !self.requests.is_empty() {
            let req = self.requests.remove(0);
            self.cancel_filter_op(&req);
            self.drop_steps(req.token);
            events.destroyed(req.token);
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn submit<E: SmsFilterEvents>(&mut self, body: Body, events: &mut E) -> RequestToken {
        let token = self.alloc_token();

        if self.registry.is_empty() {
            Self::complete(token, &body, SmsDecision::Continue, events);
            return token;
        }

        let req = Request {
            token,
            body,
            cursor: 0,
            state: ReqState::Queued,
        };
        if let Err(req) = self.requests.push(req) {
            warn!("filter chain full, dispatching request unfiltered");
            Self::complete(token, &req.body, SmsDecision::Continue, events);
            return token;
        }

        self.steps.push_back((token, Step::Run)).ok();
        self.pump(events);
        token
    }

    fn pump<E: SmsFilterEvents>(&mut self, events: &mut E) {
        while let Some((token, step)) = self.steps.pop_front() {
            let Some(idx) = self.index_of(token) else {
                continue;
            };
            match step {
                Step::Run => self.run(idx, events),
                Step::Advance => {
                    self.requests[idx].cursor += 1;
                    self.run(idx, events);
                }
                Step::Finish(decision) => self.finish(idx, decision, events),
            }
        }
    }

    fn run<E: SmsFilterEvents>(&mut self, idx: usize, events: &mut E) {
        loop {
            let cursor = self.requests[idx].cursor;
            let Some(filter) = self.registry.get(cursor) else {
                // Ran past the last filter: dispatch.
                let req = self.requests.remove(idx);
                Self::complete(req.token, &req.body, SmsDecision::Continue, events);
                return;
            };

            let req = &mut self.requests[idx];
            let token = req.token;
            let action = match &mut req.body {
                Body::Send(msg) => filter.filter_send_text(token, msg),
                Body::RecvText(msg) => filter.filter_recv_text(token, msg),
                Body::RecvDatagram(dg) => filter.filter_recv_datagram(token, dg),
            };

            match action {
                None => {
                    // Kind not handled by this filter.
                    self.requests[idx].cursor += 1;
                }
                Some(FilterAction::Pending(pending)) => {
                    self.requests[idx].state = ReqState::Pending(pending);
                    return;
                }
                Some(FilterAction::Ready(decision)) => {
                    if decision == SmsDecision::Drop {
                        info!("{} drops the message", filter.name());
                    }
                    let step = match decision {
                        SmsDecision::Continue => Step::Advance,
                        SmsDecision::Drop => Step::Finish(SmsDecision::Drop),
                    };
                    self.steps.push_back((token, step)).ok();
                    return;
                }
            }
        }
    }

    fn finish<E: SmsFilterEvents>(&mut self, idx: usize, decision: SmsDecision, events: &mut E) {
        let req = self.requests.remove(idx);
        Self::complete(req.token, &req.body, decision, events);
    }

    fn complete<E: SmsFilterEvents>(
        token: RequestToken,
        body: &Body,
        decision: SmsDecision,
        events: &mut E,
    ) {
        if decision == SmsDecision::Continue {
            match body {
                Body::Send(msg) => events.send_text(token, msg),
                Body::RecvText(msg) => events.deliver_text(token, msg),
                Body::RecvDatagram(dg) => events.deliver_datagram(token, dg),
            }
        }
        events.destroyed(token);
    }

    fn cancel_filter_op(&self, req: &Request) {
        if let ReqState::Pending(pending) = req.state {
            if let Some(filter) = self.registry.get(req.cursor) {
                filter.cancel(pending);
            }
        }
    }

    fn drop_steps(&mut self, token: RequestToken) {
        let mut keep: Deque<(RequestToken, Step), N> = Deque::new();
        while let Some(entry) = self.steps.pop_front() {
            if entry.0 != token {
                keep.push_back(entry).ok();
            }
        }
        self.steps = keep;
    }

    fn alloc_token(&mut self) -> RequestToken {
        self.next_token = self.next_token.wrapping_add(1);
        if self.next_token == 0 {
            self.next_token = 1;
        }
        RequestToken(NonZeroU32::new(self.next_token).unwrap_or(NonZeroU32::MIN))
    }

    fn index_of(&self, token: RequestToken) -> Option<usize> {
        self.requests.iter().position(|r| r.token == token)
    }
}
