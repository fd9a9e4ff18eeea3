//! SIM card status resolution.
//!
//! The UIM service reports a nested slots-by-applications record; what the
//! rest of the stack wants to know is which password the card is waiting
//! for and how many attempts are left. Some of the intermediate application
//! states are transient, so resolution is retried on a short timer until
//! the card settles or the attempt budget runs out.

use embassy_time::{Duration, Timer};
use serde::{Deserialize, Serialize};

use crate::qmi::uim::parse_card_status;
use crate::qmi::{QmiError, QmiResult};

/// Consecutive transient results before the card is declared absent.
pub const MAX_RETRY_COUNT: u32 = 100;
/// Pause between card status retries.
pub const RETRY_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardState {
    #[default]
    Absent,
    Present,
    Error,
}

impl From<u8> for CardState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Absent,
            1 => Self::Present,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppType {
    #[default]
    Unknown,
    Sim,
    Usim,
    Ruim,
}

impl From<u8> for AppType {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Sim,
            2 => Self::Usim,
            3 => Self::Ruim,
            _ => Self::Unknown,
        }
    }
}

/// Application state as the UIM service reports it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppState {
    #[default]
    Unknown,
    Detected,
    PinRequired,
    PukRequired,
    PersoCheck,
    PinBlocked,
    Illegal,
    Ready,
    Other(u8),
}

impl From<u8> for AppState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Unknown,
            1 => Self::Detected,
            2 => Self::PinRequired,
            3 => Self::PukRequired,
            4 => Self::PersoCheck,
            5 => Self::PinBlocked,
            6 => Self::Illegal,
            7 => Self::Ready,
            other => Self::Other(other),
        }
    }
}

/// Which password the card is waiting for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PasswdState {
    None,
    SimPin,
    SimPuk,
    SimPin2,
    SimPuk2,
    /// No usable answer; the caller treats the card as unusable.
    #[default]
    Invalid,
}

/// Password kinds that carry a retry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PasswdKind {
    SimPin = 0,
    SimPuk = 1,
    SimPin2 = 2,
    SimPuk2 = 3,
}

pub const NUM_PASSWD_KINDS: usize = 4;

/// Remaining attempts per password kind; −1 when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retries([i16; NUM_PASSWD_KINDS]);

impl Default for Retries {
    fn default() -> Self {
        Self([-1; NUM_PASSWD_KINDS])
    }
}

impl core::ops::Index<PasswdKind> for Retries {
    type Output = i16;

    fn index(&self, kind: PasswdKind) -> &i16 {
        &self.0[kind as usize]
    }
}

impl core::ops::IndexMut<PasswdKind> for Retries {
    fn index_mut(&mut self, kind: PasswdKind) -> &mut i16 {
        &mut self.0[kind as usize]
    }
}

/// The resolved answer for the primary GSM/UMTS application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStatus {
    pub card_state: CardState,
    pub app_type: AppType,
    pub passwd_state: PasswdState,
    pub retries: Retries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimError {
    /// The card status record is missing from the response.
    MissingStatus,
    /// The record is shorter than its own structure claims.
    Truncated,
    /// The primary-application index points at nothing.
    NoActiveApp,
    /// Resolution settled on an unusable card.
    InvalidState,
    /// The service failed, or transient states never settled.
    StatusUnavailable,
    Qmi(QmiError),
}

impl From<QmiError> for SimError {
    fn from(e: QmiError) -> Self {
        SimError::Qmi(e)
    }
}

/// Map an application state to a password state, and flag the states that
/// are worth another look because the card may still be initializing.
pub fn classify(app_state: AppState) -> (PasswdState, bool) {
    match app_state {
        AppState::PinRequired => (PasswdState::SimPin, false),
        AppState::PukRequired => (PasswdState::SimPuk, false),
        AppState::Ready => (PasswdState::None, false),
        AppState::Unknown
        | AppState::Detected
        | AppState::PersoCheck
        | AppState::PinBlocked
        | AppState::Illegal => (PasswdState::Invalid, true),
        AppState::Other(_) => (PasswdState::Invalid, false),
    }
}

/// How one card status response came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatusOutcome {
    /// A definitive answer.
    Ok(SimStatus),
    /// An answer that may improve; worth retrying.
    TempError(SimStatus),
    /// A definitive failure.
    Error,
}

/// Evaluate a card status response end to end: service result, record walk,
/// state classification and retry counters.
pub fn evaluate(result: &QmiResult<'_>) -> CardStatusOutcome {
    if result.error().is_err() {
        return CardStatusOutcome::Error;
    }

    let app = match parse_card_status(result) {
        Ok(app) => app,
        Err(_) => return CardStatusOutcome::Error,
    };

    let (passwd_state, need_retry) = classify(app.app_state);

    let mut retries = Retries::default();
    retries[PasswdKind::SimPin] = app.pin1_retries as i16;
    retries[PasswdKind::SimPuk] = app.puk1_retries as i16;
    retries[PasswdKind::SimPin2] = app.pin2_retries as i16;
    retries[PasswdKind::SimPuk2] = app.puk2_retries as i16;

    let status = SimStatus {
        card_state: app.card_state,
        app_type: app.app_type,
        passwd_state,
        retries,
    };

    if need_retry {
        CardStatusOutcome::TempError(status)
    } else {
        CardStatusOutcome::Ok(status)
    }
}

/// Retry budget for transient card states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: RETRY_DELAY,
            max_retries: MAX_RETRY_COUNT,
        }
    }
}

/// What to do after feeding one response into the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done(SimStatus),
    /// Ask again after this pause.
    Retry(Duration),
    /// Give up; treat the card as absent.
    Failed,
}

/// Folds consecutive card status outcomes into a final answer, counting
/// transient errors against the retry budget. A definitive outcome resets
/// the budget.
#[derive(Debug, Default)]
pub struct StatusResolver {
    policy: RetryPolicy,
    retry_count: u32,
}

impl StatusResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_count: 0,
        }
    }

    pub fn on_outcome(&mut self, outcome: CardStatusOutcome) -> Step {
        match outcome {
            CardStatusOutcome::Ok(status) => {
                self.retry_count = 0;
                Step::Done(status)
            }
            CardStatusOutcome::TempError(status) => {
                self.retry_count += 1;
                if self.retry_count > self.policy.max_retries {
                    debug!(
                        "giving up after {} attempts, card state {:?}",
                        self.retry_count, status.card_state
                    );
                    self.retry_count = 0;
                    Step::Failed
                } else {
                    Step::Retry(self.policy.delay)
                }
            }
            CardStatusOutcome::Error => {
                self.retry_count = 0;
                Step::Failed
            }
        }
    }
}

/// Upward notifications of the SIM layer.
pub trait SimSink {
    fn inserted_notify(&mut self, present: bool);

    fn initialized_notify(&mut self) {}

    /// The SIM service is up and card state is known; expose the atom.
    fn register(&mut self) {}

    /// The SIM service could not be brought up; withdraw the atom.
    fn remove(&mut self) {}
}

/// Provides raw card status responses (the TLV region of the response
/// message).
pub trait CardStatusSource {
    async fn card_status(&mut self) -> Result<heapless::Vec<u8, CARD_STATUS_BUF>, SimError>;
}

/// Backing size for a card status response.
pub const CARD_STATUS_BUF: usize = 256;

/// Resolve the password state, retrying transient card states on a timer.
/// On failure the sink learns the card is unusable; an answer of
/// [`PasswdState::Invalid`] counts as failure.
pub async fn query_passwd_state<S, K>(
    source: &mut S,
    resolver: &mut StatusResolver,
    sink: &mut K,
) -> Result<PasswdState, SimError>
where
    S: CardStatusSource,
    K: SimSink,
{
    loop {
        let raw = source.card_status().await?;
        let result = QmiResult::new(&raw);

        match resolver.on_outcome(evaluate(&result)) {
            Step::Done(status) => {
                debug!("passwd state {:?}", status.passwd_state);
                if status.passwd_state == PasswdState::Invalid {
                    sink.inserted_notify(false);
                    return Err(SimError::InvalidState);
                }
                return Ok(status.passwd_state);
            }
            Step::Failed => {
                sink.inserted_notify(false);
                return Err(SimError::StatusUnavailable);
            }
            Step::Retry(delay) => {
                debug!("retrying card status query");
                Timer::after(delay).await;
            }
        }
    }
}

/// One-shot retry counters, without the retry loop.
pub fn pin_retries(result: &QmiResult<'_>) -> Result<Retries, SimError> {
    match evaluate(result) {
        CardStatusOutcome::Ok(status) => Ok(status.retries),
        _ => Err(SimError::StatusUnavailable),
    }
}

/// Handle the initial card status at service bring-up. The atom is exposed
/// either way; a present card is additionally announced and marked
/// initialized, anything else stays quiet until the card changes.
pub fn on_initial_status<K: SimSink>(result: &QmiResult<'_>, sink: &mut K) {
    sink.register();
    match evaluate(result) {
        CardStatusOutcome::Ok(status) if status.card_state == CardState::Present => {
            sink.inserted_notify(true);
            sink.initialized_notify();
        }
        _ => {}
    }
}

/// Handle an unsolicited card status change.
pub fn on_status_change<K: SimSink>(result: &QmiResult<'_>, sink: &mut K) {
    let present = matches!(
        evaluate(result),
        CardStatusOutcome::Ok(SimStatus {
            card_state: CardState::Present,
            ..
        })
    );
    sink.inserted_notify(present);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qmi::uim::tests::card_status_tlv;

    #[test]
    fn classification_table() {
        assert_eq!(classify(AppState::PinRequired), (PasswdState::SimPin, false));
        assert_eq!(classify(AppState::PukRequired), (PasswdState::SimPuk, false));
        assert_eq!(classify(AppState::Ready), (PasswdState::None, false));

        for transient in [
            AppState::Unknown,
            AppState::Detected,
            AppState::PersoCheck,
            AppState::PinBlocked,
            AppState::Illegal,
        ] {
            assert_eq!(classify(transient), (PasswdState::Invalid, true));
        }

        assert_eq!(classify(AppState::Other(0x55)), (PasswdState::Invalid, false));
    }

    #[test]
    fn pin_required_card_resolves_to_sim_pin() {
        // present card, one slot, one app waiting for PIN1,
        // retries 3/10 and 3/10
        let raw = card_status_tlv(1, 2, [3, 10, 3, 10]);
        let result = QmiResult::new(&raw);

        let CardStatusOutcome::Ok(status) = evaluate(&result) else {
            panic!("expected a definitive outcome");
        };
        assert_eq!(status.card_state, CardState::Present);
        assert_eq!(status.app_type, AppType::Usim);
        assert_eq!(status.passwd_state, PasswdState::SimPin);
        assert_eq!(status.retries[PasswdKind::SimPin], 3);
        assert_eq!(status.retries[PasswdKind::SimPuk], 10);
        assert_eq!(status.retries[PasswdKind::SimPin2], 3);
        assert_eq!(status.retries[PasswdKind::SimPuk2], 10);
    }

    #[test]
    fn detected_state_asks_for_a_retry() {
        let raw = card_status_tlv(1, 1, [0, 0, 0, 0]);
        let result = QmiResult::new(&raw);
        assert!(matches!(
            evaluate(&result),
            CardStatusOutcome::TempError(SimStatus {
                passwd_state: PasswdState::Invalid,
                ..
            })
        ));
    }

    #[test]
    fn missing_record_is_a_definitive_error() {
        let result = QmiResult::new(&[]);
        assert_eq!(evaluate(&result), CardStatusOutcome::Error);
    }

    #[test]
    fn service_failure_is_a_definitive_error() {
        let raw = [0x02, 0x04, 0x00, 0x01, 0x00, 0x03, 0x00];
        assert_eq!(evaluate(&QmiResult::new(&raw)), CardStatusOutcome::Error);
    }

    #[test]
    fn resolver_retries_until_the_budget_runs_out() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(20),
            max_retries: 3,
        };
        let mut resolver = StatusResolver::new(policy);
        let transient = CardStatusOutcome::TempError(SimStatus::default());

        for _ in 0..3 {
            assert_eq!(
                resolver.on_outcome(transient),
                Step::Retry(Duration::from_millis(20))
            );
        }
        assert_eq!(resolver.on_outcome(transient), Step::Failed);

        // the budget resets after giving up
        assert_eq!(
            resolver.on_outcome(transient),
            Step::Retry(Duration::from_millis(20))
        );
    }

    #[test]
    fn definitive_outcome_resets_the_budget() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(20),
            max_retries: 2,
        };
        let mut resolver = StatusResolver::new(policy);
        let transient = CardStatusOutcome::TempError(SimStatus::default());

        assert!(matches!(resolver.on_outcome(transient), Step::Retry(_)));
        assert!(matches!(
            resolver.on_outcome(CardStatusOutcome::Ok(SimStatus::default())),
            Step::Done(_)
        ));

        // a fresh run of transients gets the full budget again
        assert!(matches!(resolver.on_outcome(transient), Step::Retry(_)));
        assert!(matches!(resolver.on_outcome(transient), Step::Retry(_)));
        assert_eq!(resolver.on_outcome(transient), Step::Failed);
    }

    #[test]
    fn status_change_notifications() {
        struct Sink {
            inserted: std::vec::Vec<bool>,
            initialized: usize,
        }
        impl SimSink for Sink {
            fn inserted_notify(&mut self, present: bool) {
                self.inserted.push(present);
            }
            fn initialized_notify(&mut self) {
                self.initialized += 1;
            }
        }

        let mut sink = Sink {
            inserted: std::vec::Vec::new(),
            initialized: 0,
        };

        let present = card_status_tlv(1, 7, [3, 10, 3, 10]);
        on_initial_status(&QmiResult::new(&present), &mut sink);
        assert_eq!(sink.inserted, [true]);
        assert_eq!(sink.initialized, 1);

        let absent = card_status_tlv(0, 7, [3, 10, 3, 10]);
        on_status_change(&QmiResult::new(&absent), &mut sink);
        assert_eq!(sink.inserted, [true, false]);
    }
}
