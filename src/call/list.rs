//! Reconciliation of the retained call set against a freshly polled one.
//!
//! The modem is the single source of truth for the set of active calls; we
//! only ever learn about changes by comparing a new snapshot against the one
//! we kept. The merge below walks both sets in ascending id order and emits
//! exactly one lifecycle event per affected call.

use heapless::Vec;

use super::{Call, CallDirection, CallStatus, CallType, DisconnectReason, PhoneNumber, Validity};

/// How many RINGs we tolerate before giving up on CLIP and announcing an
/// incoming call without it.
const DEFAULT_RING_THRESHOLD: u8 = 3;

/// Where a snapshot came from; decides the disconnect reason for calls that
/// vanished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReconcileCause {
    /// Regular call-list poll.
    Poll,
    /// The radio went away; every retained call is reported as an error
    /// disconnect. The caller passes an empty snapshot alongside.
    RadioUnavailable,
}

/// Receives call lifecycle events in the exact order the reconciler emits
/// them. Supplementary-service notifications share the sink because they
/// arrive on the same signalling path.
pub trait VoicecallSink {
    /// A call is new or one of its attributes changed.
    fn notify(&mut self, call: &Call);

    fn disconnected(&mut self, id: u32, reason: DisconnectReason);

    /// Mobile-terminated supplementary-service notification (+CSSU style).
    fn ssn_mt_notify(&mut self, code: i32, index: i32, number: &PhoneNumber) {
        let _ = (code, index, number);
    }

    /// Mobile-originated supplementary-service notification (+CSSI style).
    fn ssn_mo_notify(&mut self, code: i32, index: i32) {
        let _ = (code, index);
    }
}

/// The retained call set plus the bookkeeping needed to classify the next
/// snapshot: locally-released ids, and the RING/CLIP gate for incoming
/// calls on modems that report CLIP separately.
#[derive(Debug)]
pub struct CallList<const N: usize = { super::MAX_CALLS }> {
    calls: Vec<Call, N>,
    /// Bit per call id; set when we hung the call up ourselves.
    local_release: u32,
    need_clip: bool,
    ring_count: u8,
    ring_threshold: u8,
}

impl<const N: usize> Default for CallList<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CallList<N> {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            local_release: 0,
            need_clip: false,
            ring_count: 0,
            ring_threshold: DEFAULT_RING_THRESHOLD,
        }
    }

    pub fn with_ring_threshold(mut self, threshold: u8) -> Self {
        self.ring_threshold = threshold;
        self
    }

    /// Retained calls, ascending by id. Never contains a disconnected entry.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn find(&self, id: u32) -> Option<&Call> {
        self.calls.iter().find(|c| c.id == id)
    }

    pub fn find_by_status(&self, status: CallStatus) -> Option<&Call> {
        self.calls.iter().find(|c| c.status == status)
    }

    /// Record that calls currently in one of `statuses` are being released
    /// locally, so their disappearance from the next snapshot is reported as
    /// [`DisconnectReason::LocalHangup`].
    pub fn mark_local_release(&mut self, statuses: &[CallStatus]) {
        for call in &self.calls {
            if statuses.contains(&call.status) {
                self.local_release |= 1 << (call.id & 31);
            }
        }
    }

    /// Arm the CLIP gate: the next incoming call is held back from `notify`
    /// until its CLIP arrives or the RING counter passes the threshold.
    pub fn set_need_clip(&mut self) {
        self.need_clip = true;
        self.ring_count = 0;
    }

    /// Count an unsolicited RING. Once the threshold is exceeded a gated
    /// incoming call is announced without CLIP and the gate is cleared.
    pub fn ring<S: VoicecallSink>(&mut self, sink: &mut S) {
        self.ring_count = self.ring_count.saturating_add(1);

        if self.need_clip && self.ring_count > self.ring_threshold {
            self.need_clip = false;
            self.ring_count = 0;
            if let Some(call) = self.find_by_status(CallStatus::Incoming) {
                if call.call_type == CallType::Voice {
                    sink.notify(call);
                }
            }
        }
    }

    /// A dial response told us the assigned call id before the next snapshot
    /// could. Insert a dialing stub so the snapshot matches it by id instead
    /// of raising a spurious new/disconnect pair. A late response whose id
    /// is already known does nothing.
    pub fn dial_callback<S: VoicecallSink>(
        &mut self,
        number: &PhoneNumber,
        id: u32,
        sink: &mut S,
    ) {
        if self.calls.iter().any(|c| c.id == id) {
            return;
        }

        let mut call = Call::new(id, CallStatus::Dialing, CallDirection::MobileOriginated);
        call.called_number = number.clone();

        let pos = self
            .calls
            .iter()
            .position(|c| c.id > id)
            .unwrap_or(self.calls.len());

        if self.calls.insert(pos, call).is_err() {
            warn!("call list full, dropping dial stub for id {}", id);
            return;
        }

        sink.notify(&self.calls[pos]);
    }

    /// Reconcile the retained set against `new_calls` (sorted ascending by
    /// id) and swap it in. Events are emitted in ascending id order, one per
    /// affected call: disconnects for ids missing from the snapshot, news
    /// for unknown ids, modifications for matched ids whose attributes
    /// differ after carrying forward what only the old call knows
    /// (called-number, and CLIP/CNAP validity once seen as valid).
    pub fn reconcile<S: VoicecallSink>(
        &mut self,
        new_calls: Vec<Call, N>,
        cause: ReconcileCause,
        sink: &mut S,
    ) {
        let old_calls = core::mem::take(&mut self.calls);
        let mut retained: Vec<Call, N> = Vec::new();

        let mut o = old_calls.iter().peekable();
        let mut n = new_calls.iter().peekable();

        loop {
            // Disconnected snapshot entries are dropped outright; they must
            // never enter the retained set.
            if let Some(nc) = n.peek() {
                if nc.status == CallStatus::Disconnected {
                    n.next();
                    continue;
                }
            }

            match (o.peek().copied(), n.peek().copied()) {
                (None, None) => break,
                (Some(oc), None) => {
                    sink.disconnected(oc.id, self.disconnect_reason(oc.id, cause));
                    o.next();
                }
                (Some(oc), Some(nc)) if nc.id > oc.id => {
                    sink.disconnected(oc.id, self.disconnect_reason(oc.id, cause));
                    o.next();
                }
                (None, Some(nc)) => {
                    self.take_new(nc, &mut retained, sink);
                    n.next();
                }
                (Some(oc), Some(nc)) if nc.id < oc.id => {
                    self.take_new(nc, &mut retained, sink);
                    n.next();
                }
                (Some(oc), Some(nc)) => {
                    let mut nc = nc.clone();

                    // CLIP is only ever told to us once; keep a known-valid
                    // flag from the previous snapshot. Same for CNAP, and
                    // the called number only arrives on dial.
                    if oc.clip_validity == Validity::Valid {
                        nc.clip_validity = oc.clip_validity;
                    }
                    nc.cnap_validity = oc.cnap_validity;
                    nc.called_number = oc.called_number.clone();

                    if nc.status == CallStatus::Incoming && self.need_clip {
                        // The gated first announcement: the snapshot now
                        // carries whatever CLIP we are going to get.
                        if nc.call_type == CallType::Voice {
                            sink.notify(&nc);
                        }
                        self.need_clip = false;
                    } else if nc != *oc && nc.call_type == CallType::Voice {
                        sink.notify(&nc);
                    }

                    if retained.push(nc).is_err() {
                        warn!("call list full, dropping call id {}", oc.id);
                    }
                    o.next();
                    n.next();
                }
            }
        }

        self.calls = retained;
        self.local_release = 0;
    }

    fn take_new<S: VoicecallSink>(&self, nc: &Call, retained: &mut Vec<Call, N>, sink: &mut S) {
        let announce = nc.call_type == CallType::Voice
            && !(nc.status == CallStatus::Incoming && self.need_clip);
        if announce {
            sink.notify(nc);
        }
        if retained.push(nc.clone()).is_err() {
            warn!("call list full, dropping call id {}", nc.id);
        }
    }

    fn disconnect_reason(&self, id: u32, cause: ReconcileCause) -> DisconnectReason {
        if self.local_release & (1 << (id & 31)) != 0 {
            DisconnectReason::LocalHangup
        } else if cause == ReconcileCause::RadioUnavailable {
            DisconnectReason::Error
        } else {
            DisconnectReason::Unknown
        }
    }
}
