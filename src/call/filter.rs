//! Decision pipeline for outgoing dials and incoming calls.
//!
//! Every request walks the registered filters in priority order. A filter
//! decides synchronously, or suspends the request by returning a pending id
//! and resumes it later through [`FilterChain::resume_dial`] /
//! [`FilterChain::resume_incoming`]. Between any two filter invocations the
//! request passes through the chain's step queue, so a stack of synchronous
//! filters never recurses and a request can be cancelled at every seam.

use core::num::NonZeroU32;

use heapless::{Deque, Vec};

use super::{Call, ClirOption, PhoneNumber};
use crate::filter::{FilterAction, FilterMeta, FilterRegistry, PendingId, RequestToken};

/// Default number of in-flight requests per chain.
pub const MAX_REQUESTS: usize = 4;
/// Default registry capacity.
pub const MAX_FILTERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DialResult {
    /// The driver may go ahead with the dial.
    Continue,
    /// The driver must not dial.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IncomingResult {
    /// Handle the call normally.
    Continue,
    /// The driver must release the call.
    Hangup,
    /// Keep the call but do not surface it.
    Ignore,
}

/// Payload a dial filter sees.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DialRequest {
    pub number: PhoneNumber,
    pub clir: ClirOption,
}

/// A voicecall decision filter. Handlers a filter does not implement return
/// `None` and are skipped. A filter returning [`FilterAction::Pending`] must
/// later resume the request exactly once, and must implement [`cancel`]
/// (idempotent, never resumes) for the id it returned.
///
/// [`cancel`]: VoicecallFilter::cancel
pub trait VoicecallFilter: FilterMeta {
    fn filter_dial(
        &self,
        token: RequestToken,
        request: &DialRequest,
    ) -> Option<FilterAction<DialResult>> {
        let _ = (token, request);
        None
    }

    fn filter_incoming(
        &self,
        token: RequestToken,
        call: &Call,
    ) -> Option<FilterAction<IncomingResult>> {
        let _ = (token, call);
        None
    }

    fn cancel(&self, pending: PendingId) {
        let _ = pending;
    }
}

/// Chain owner callbacks. For every submitted request either the matching
/// `*_complete` fires followed by `destroyed`, or (on cancellation) only
/// `destroyed` fires. Each fires at most once per request.
pub trait VoicecallFilterEvents {
    fn dial_complete(&mut self, token: RequestToken, result: DialResult);
    fn incoming_complete(&mut self, token: RequestToken, result: IncomingResult);
    fn destroyed(&mut self, token: RequestToken);
}

#[derive(Debug)]
enum Body {
    Dial {
        request: DialRequest,
        /// Set when the request is keyed to an already-known call.
        target: Option<u32>,
    },
    Incoming {
        call: Call,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Dial(DialResult),
    Incoming(IncomingResult),
}

impl Decision {
    fn is_terminal(self) -> bool {
        !matches!(
            self,
            Decision::Dial(DialResult::Continue) | Decision::Incoming(IncomingResult::Continue)
        )
    }
}

/// Exactly one of: a step sits in the queue (`Queued`), or a filter owes us
/// a resume (`Pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqState {
    Queued,
    Pending(PendingId),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Invoke the filter at the current cursor.
    Run,
    /// Move past the filter that just continued, then run.
    Advance,
    /// Complete with a terminal decision.
    Finish(Decision),
}

#[derive(Debug)]
struct Request {
    token: RequestToken,
    body: Body,
    cursor: usize,
    state: ReqState,
}

impl Request {
    fn target(&self) -> Option<u32> {
        match &self.body {
            Body::Dial { target, .. } => *target,
            Body::Incoming { call } => Some(call.id),
        }
    }
}

/// One filter chain per voicecall session. Dropping the chain forgets all
/// in-flight requests without notifications; call
/// [`FilterChain::cancel_all`] first when destroy callbacks matter.
pub struct FilterChain<'r, const N: usize = { MAX_REQUESTS }, const R: usize = { MAX_FILTERS }> {
    registry: &'r FilterRegistry<dyn VoicecallFilter, R>,
    requests: Vec<Request, N>,
    steps: Deque<(RequestToken, Step), N>,
    next_token: u32,
}

impl<'r, const N: usize, const R: usize> FilterChain<'r, N, R> {
    pub fn new(registry: &'r FilterRegistry<dyn VoicecallFilter, R>) -> Self {
        Self {
            registry,
            requests: Vec::new(),
            steps: Deque::new(),
            next_token: 0,
        }
    }

    /// Gate an outgoing dial. The decision arrives through
    /// [`VoicecallFilterEvents::dial_complete`], possibly before this
    /// returns if every filter answers synchronously.
    pub fn submit_dial<E: VoicecallFilterEvents>(
        &mut self,
        number: &PhoneNumber,
        clir: ClirOption,
        events: &mut E,
    ) -> RequestToken {
        let request = DialRequest {
            number: number.clone(),
            clir,
        };
        self.submit(
            Body::Dial {
                request,
                target: None,
            },
            events,
        )
    }

    /// Dial gate keyed to a call that already exists, so it can be cancelled
    /// and restarted along with the call.
    pub fn submit_dial_check<E: VoicecallFilterEvents>(
        &mut self,
        call: &Call,
        events: &mut E,
    ) -> RequestToken {
        let request = DialRequest {
            number: call.phone_number.clone(),
            clir: ClirOption::Default,
        };
        self.submit(
            Body::Dial {
                request,
                target: Some(call.id),
            },
            events,
        )
    }

    /// Gate an incoming call before it is surfaced.
    pub fn submit_incoming<E: VoicecallFilterEvents>(
        &mut self,
        call: &Call,
        events: &mut E,
    ) -> RequestToken {
        self.submit(Body::Incoming { call: call.clone() }, events)
    }

    /// Continuation entry point for a filter that suspended a dial request.
    pub fn resume_dial<E: VoicecallFilterEvents>(
        &mut self,
        token: RequestToken,
        result: DialResult,
        events: &mut E,
    ) {
        self.resume(token, Decision::Dial(result), events)
    }

    /// Continuation entry point for a filter that suspended an incoming
    /// request.
    pub fn resume_incoming<E: VoicecallFilterEvents>(
        &mut self,
        token: RequestToken,
        result: IncomingResult,
        events: &mut E,
    ) {
        self.resume(token, Decision::Incoming(result), events)
    }

    /// Cancel every request bound to `call_id`, or all requests when `None`.
    /// Destroy callbacks run; completion callbacks do not. Cancelling twice
    /// is a no-op.
    pub fn cancel<E: VoicecallFilterEvents>(&mut self, call_id: Option<u32>, events: &mut E) {
        let mut i = 0;
        while i < self.requests.len() {
            let matches = call_id.map_or(true, |id| self.requests[i].target() == Some(id));
            if matches {
                let req = self.requests.remove(i);
                self.cancel_filter_op(&req);
                self.drop_steps(req.token);
                events.destroyed(req.token);
            } else {
                i += 1;
            }
        }
    }

    pub fn cancel_all<E: VoicecallFilterEvents>(&mut self, events: &mut E) {
        self.cancel(None, events)
    }

    /// Cancel whatever the matching requests are currently waiting on and
    /// run them through the chain again from the first filter.
    pub fn restart<E: VoicecallFilterEvents>(&mut self, call_id: Option<u32>, events: &mut E) {
        let mut tokens: Vec<RequestToken, N> = Vec::new();
        for req in self.requests.iter() {
            let matches = call_id.map_or(true, |id| req.target() == Some(id));
            if matches {
                tokens.push(req.token).ok();
            }
        }

        for token in tokens {
            if let Some(idx) = self.index_of(token) {
                self.cancel_filter_op(&self.requests[idx]);
                self.drop_steps(token);
                let req = &mut self.requests[idx];
                req.cursor = 0;
                req.state = ReqState::Queued;
                self.steps.push_back((token, Step::Run)).ok();
            }
        }
        self.pump(events);
    }

    /// In-flight request count; useful for steady-state assertions.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn submit<E: VoicecallFilterEvents>(&mut self, body: Body, events: &mut E) -> RequestToken {
        let token = self.alloc_token();

        if self.registry.is_empty() {
            // Nothing to consult; allow synchronously.
            Self::complete(token, &body, Self::allow(&body), events);
            return token;
        }

        let req = Request {
            token,
            body,
            cursor: 0,
            state: ReqState::Queued,
        };
        if let Err(req) = self.requests.push(req) {
            warn!("filter chain full, allowing request unfiltered");
            Self::complete(token, &req.body, Self::allow(&req.body), events);
            return token;
        }

        self.steps.push_back((token, Step::Run)).ok();
        self.pump(events);
        token
    }

    fn resume<E: VoicecallFilterEvents>(
        &mut self,
        token: RequestToken,
        decision: Decision,
        events: &mut E,
    ) {
        let Some(idx) = self.index_of(token) else {
            // Late resume for a request that was cancelled or completed.
            return;
        };

        let req = &mut self.requests[idx];
        if !matches!(req.state, ReqState::Pending(_)) {
            warn!("resume for a request that is not suspended");
            return;
        }

        self.log_decision(idx, decision);
        self.requests[idx].state = ReqState::Queued;
        let step = if decision.is_terminal() {
            Step::Finish(decision)
        } else {
            Step::Advance
        };
        self.steps.push_back((token, step)).ok();
        self.pump(events);
    }

    fn pump<E: VoicecallFilterEvents>(&mut self, events: &mut E) {
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

    /// Find the next filter that handles this request kind and invoke it.
    fn run<E: VoicecallFilterEvents>(&mut self, idx: usize, events: &mut E) {
        loop {
            let cursor = self.requests[idx].cursor;
            let Some(filter) = self.registry.get(cursor) else {
                // Ran past the last filter: implicit allow.
                let req = self.requests.remove(idx);
                Self::complete(req.token, &req.body, Self::allow(&req.body), events);
                return;
            };

            let req = &self.requests[idx];
            let action = match &req.body {
                Body::Dial { request, .. } => match filter.filter_dial(req.token, request) {
                    None => None,
                    Some(FilterAction::Pending(p)) => Some(FilterAction::Pending(p)),
                    Some(FilterAction::Ready(d)) => Some(FilterAction::Ready(Decision::Dial(d))),
                },
                Body::Incoming { call } => match filter.filter_incoming(req.token, call) {
                    None => None,
                    Some(FilterAction::Pending(p)) => Some(FilterAction::Pending(p)),
                    Some(FilterAction::Ready(d)) => {
                        Some(FilterAction::Ready(Decision::Incoming(d)))
                    }
                },
            };

            match action {
                None => {
                    // This filter does not handle the kind; skip it.
                    self.requests[idx].cursor += 1;
                }
                Some(FilterAction::Pending(pending)) => {
                    self.requests[idx].state = ReqState::Pending(pending);
                    return;
                }
                Some(FilterAction::Ready(decision)) => {
                    self.log_decision(idx, decision);
                    let token = self.requests[idx].token;
                    let step = if decision.is_terminal() {
                        Step::Finish(decision)
                    } else {
                        Step::Advance
                    };
                    self.steps.push_back((token, step)).ok();
                    return;
                }
            }
        }
    }

    fn finish<E: VoicecallFilterEvents>(&mut self, idx: usize, decision: Decision, events: &mut E) {
        let req = self.requests.remove(idx);
        Self::complete(req.token, &req.body, decision, events);
    }

    /// The implicit end-of-chain decision.
    fn allow(body: &Body) -> Decision {
        match body {
            Body::Dial { .. } => Decision::Dial(DialResult::Continue),
            Body::Incoming { .. } => Decision::Incoming(IncomingResult::Continue),
        }
    }

    fn complete<E: VoicecallFilterEvents>(
        token: RequestToken,
        body: &Body,
        decision: Decision,
        events: &mut E,
    ) {
        match (body, decision) {
            (Body::Dial { .. }, Decision::Dial(result)) => events.dial_complete(token, result),
            (Body::Incoming { .. }, Decision::Incoming(result)) => {
                events.incoming_complete(token, result)
            }
            _ => error!("filter decision does not match the request kind"),
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

    fn log_decision(&self, idx: usize, decision: Decision) {
        let req = &self.requests[idx];
        let name = self
            .registry
            .get(req.cursor)
            .map(|f| f.name())
            .unwrap_or("?");

        match (&req.body, decision) {
            (Body::Dial { request, .. }, Decision::Dial(DialResult::Block)) => {
                info!("{} is refusing to dial {:?}", name, request.number.number);
            }
            (Body::Dial { request, .. }, Decision::Dial(DialResult::Continue)) => {
                debug!("{} is ok with dialing {:?}", name, request.number.number);
            }
            (Body::Incoming { call }, Decision::Incoming(IncomingResult::Hangup)) => {
                info!(
                    "{} hangs up incoming call from {:?}",
                    name, call.phone_number.number
                );
            }
            (Body::Incoming { call }, Decision::Incoming(IncomingResult::Ignore)) => {
                info!(
                    "{} ignores incoming call from {:?}",
                    name, call.phone_number.number
                );
            }
            (Body::Incoming { call }, Decision::Incoming(IncomingResult::Continue)) => {
                debug!(
                    "{} is ok with accepting {:?}",
                    name, call.phone_number.number
                );
            }
            _ => {}
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallDirection, CallStatus};
    use core::cell::{Cell, RefCell};

    #[derive(Debug, PartialEq)]
    enum Ev {
        Dial(DialResult),
        Incoming(IncomingResult),
        Destroyed,
    }

    #[derive(Default)]
    struct Recorder {
        events: std::vec::Vec<(RequestToken, Ev)>,
    }

    impl Recorder {
        fn destroy_count(&self, token: RequestToken) -> usize {
            self.events
                .iter()
                .filter(|(t, e)| *t == token && *e == Ev::Destroyed)
                .count()
        }
    }

    impl VoicecallFilterEvents for Recorder {
        fn dial_complete(&mut self, token: RequestToken, result: DialResult) {
            self.events.push((token, Ev::Dial(result)));
        }

        fn incoming_complete(&mut self, token: RequestToken, result: IncomingResult) {
            self.events.push((token, Ev::Incoming(result)));
        }

        fn destroyed(&mut self, token: RequestToken) {
            self.events.push((token, Ev::Destroyed));
        }
    }

    struct Probe {
        name: &'static str,
        priority: i32,
        dial: Option<FilterAction<DialResult>>,
        incoming: Option<FilterAction<IncomingResult>>,
        dial_seen: Cell<usize>,
        incoming_seen: Cell<usize>,
        cancelled: RefCell<std::vec::Vec<PendingId>>,
    }

    impl Probe {
        fn new(name: &'static str, priority: i32) -> Self {
            Self {
                name,
                priority,
                dial: None,
                incoming: None,
                dial_seen: Cell::new(0),
                incoming_seen: Cell::new(0),
                cancelled: RefCell::new(std::vec::Vec::new()),
            }
        }

        fn dial(mut self, action: FilterAction<DialResult>) -> Self {
            self.dial = Some(action);
            self
        }

        fn incoming(mut self, action: FilterAction<IncomingResult>) -> Self {
            self.incoming = Some(action);
            self
        }

        fn leak(self) -> &'static Probe {
            Box::leak(Box::new(self))
        }
    }

    impl FilterMeta for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    impl VoicecallFilter for Probe {
        fn filter_dial(
            &self,
            _token: RequestToken,
            _request: &DialRequest,
        ) -> Option<FilterAction<DialResult>> {
            if self.dial.is_some() {
                self.dial_seen.set(self.dial_seen.get() + 1);
            }
            self.dial
        }

        fn filter_incoming(
            &self,
            _token: RequestToken,
            _call: &Call,
        ) -> Option<FilterAction<IncomingResult>> {
            if self.incoming.is_some() {
                self.incoming_seen.set(self.incoming_seen.get() + 1);
            }
            self.incoming
        }

        fn cancel(&self, pending: PendingId) {
            self.cancelled.borrow_mut().push(pending);
        }
    }

    fn registry() -> &'static FilterRegistry<dyn VoicecallFilter, MAX_FILTERS> {
        Box::leak(Box::new(FilterRegistry::new()))
    }

    fn number() -> PhoneNumber {
        PhoneNumber::new("+1234", 145)
    }

    fn pending(id: u32) -> PendingId {
        PendingId::new(id).unwrap()
    }

    #[test]
    fn empty_registry_allows_synchronously() {
        let reg = registry();
        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();

        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        assert_eq!(
            rec.events,
            [(token, Ev::Dial(DialResult::Continue)), (token, Ev::Destroyed)]
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn synchronous_block_completes_with_block() {
        let reg = registry();
        let f = Probe::new("blocker", 0)
            .dial(FilterAction::Ready(DialResult::Block))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        assert_eq!(
            rec.events,
            [(token, Ev::Dial(DialResult::Block)), (token, Ev::Destroyed)]
        );
        assert_eq!(rec.destroy_count(token), 1);
        assert_eq!(f.dial_seen.get(), 1);
        assert!(chain.is_empty());
    }

    #[test]
    fn filters_run_in_priority_order_and_once() {
        let reg = registry();
        let low = Probe::new("low", 1)
            .dial(FilterAction::Ready(DialResult::Block))
            .leak();
        let high = Probe::new("high", 2)
            .dial(FilterAction::Ready(DialResult::Continue))
            .leak();
        reg.register(low).unwrap();
        reg.register(high).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        // high continued, low blocked; each ran exactly once
        assert_eq!(high.dial_seen.get(), 1);
        assert_eq!(low.dial_seen.get(), 1);
        assert_eq!(
            rec.events,
            [(token, Ev::Dial(DialResult::Block)), (token, Ev::Destroyed)]
        );
    }

    #[test]
    fn filters_without_a_handler_are_skipped() {
        let reg = registry();
        let incoming_only = Probe::new("incoming-only", 5)
            .incoming(FilterAction::Ready(IncomingResult::Continue))
            .leak();
        let dialer = Probe::new("dialer", 1)
            .dial(FilterAction::Ready(DialResult::Continue))
            .leak();
        reg.register(incoming_only).unwrap();
        reg.register(dialer).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        assert_eq!(incoming_only.dial_seen.get(), 0);
        assert_eq!(dialer.dial_seen.get(), 1);
        assert_eq!(
            rec.events,
            [(token, Ev::Dial(DialResult::Continue)), (token, Ev::Destroyed)]
        );
    }

    #[test]
    fn pending_filter_suspends_until_resume() {
        let reg = registry();
        let f = Probe::new("async", 0)
            .dial(FilterAction::Pending(pending(7)))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        // suspended: nothing delivered yet
        assert!(rec.events.is_empty());
        assert_eq!(chain.len(), 1);

        chain.resume_dial(token, DialResult::Continue, &mut rec);
        assert_eq!(
            rec.events,
            [(token, Ev::Dial(DialResult::Continue)), (token, Ev::Destroyed)]
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn cancel_runs_filter_cancel_and_skips_completion() {
        let reg = registry();
        let f = Probe::new("async", 0)
            .dial(FilterAction::Pending(pending(9)))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        chain.cancel_all(&mut rec);
        assert_eq!(*f.cancelled.borrow(), [pending(9)]);
        assert_eq!(rec.events, [(token, Ev::Destroyed)]);

        // second cancel is a no-op
        chain.cancel_all(&mut rec);
        assert_eq!(rec.events.len(), 1);

        // late resume from the filter is ignored
        chain.resume_dial(token, DialResult::Continue, &mut rec);
        assert_eq!(rec.events.len(), 1);
    }

    #[test]
    fn cancel_by_call_only_touches_bound_requests() {
        let reg = registry();
        let f = Probe::new("async", 0)
            .dial(FilterAction::Pending(pending(1)))
            .incoming(FilterAction::Pending(pending(2)))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();

        let call = Call::new(5, CallStatus::Incoming, CallDirection::MobileTerminated);
        let in_token = chain.submit_incoming(&call, &mut rec);
        let dial_token = chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        chain.cancel(Some(5), &mut rec);
        assert_eq!(rec.events, [(in_token, Ev::Destroyed)]);
        assert_eq!(chain.len(), 1);

        chain.resume_dial(dial_token, DialResult::Block, &mut rec);
        assert_eq!(
            rec.events,
            [
                (in_token, Ev::Destroyed),
                (dial_token, Ev::Dial(DialResult::Block)),
                (dial_token, Ev::Destroyed),
            ]
        );
    }

    #[test]
    fn restart_reruns_from_the_first_filter() {
        let reg = registry();
        let f = Probe::new("async", 0)
            .incoming(FilterAction::Pending(pending(3)))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        let call = Call::new(2, CallStatus::Incoming, CallDirection::MobileTerminated);
        let token = chain.submit_incoming(&call, &mut rec);

        assert_eq!(f.incoming_seen.get(), 1);

        chain.restart(Some(2), &mut rec);
        // the pending operation was cancelled and the filter consulted again
        assert_eq!(*f.cancelled.borrow(), [pending(3)]);
        assert_eq!(f.incoming_seen.get(), 2);
        assert!(rec.events.is_empty());

        chain.resume_incoming(token, IncomingResult::Hangup, &mut rec);
        assert_eq!(
            rec.events,
            [
                (token, Ev::Incoming(IncomingResult::Hangup)),
                (token, Ev::Destroyed)
            ]
        );
    }

    #[test]
    fn incoming_terminal_outcomes() {
        for (action, expected) in [
            (IncomingResult::Hangup, Ev::Incoming(IncomingResult::Hangup)),
            (IncomingResult::Ignore, Ev::Incoming(IncomingResult::Ignore)),
        ] {
            let reg = registry();
            let f = Probe::new("screener", 0)
                .incoming(FilterAction::Ready(action))
                .leak();
            reg.register(f).unwrap();

            let mut chain: FilterChain = FilterChain::new(reg);
            let mut rec = Recorder::default();
            let call = Call::new(1, CallStatus::Incoming, CallDirection::MobileTerminated);
            let token = chain.submit_incoming(&call, &mut rec);

            assert_eq!(rec.events, [(token, expected), (token, Ev::Destroyed)]);
        }
    }

    #[test]
    fn steady_state_requests_are_pending_or_queued_never_both() {
        let reg = registry();
        let f = Probe::new("async", 0)
            .dial(FilterAction::Pending(pending(4)))
            .leak();
        reg.register(f).unwrap();

        let mut chain: FilterChain = FilterChain::new(reg);
        let mut rec = Recorder::default();
        chain.submit_dial(&number(), ClirOption::Default, &mut rec);

        // after the pump drains, the one live request is suspended in its
        // filter and owns no queued step
        assert_eq!(chain.len(), 1);
        assert!(chain.steps.is_empty());
        assert!(matches!(chain.requests[0].state, ReqState::Pending(_)));
    }
}
