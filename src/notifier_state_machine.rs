//! Defines the state machine for a [`ChangeNotifier`](crate::ChangeNotifier) long-poll session.
//!
//! Broadly, the state machine flow is as follows:
//!
//! 1. Start polling (`Idle` -> `Polling`).
//! 2. Issue a long-poll request, which blocks until the TV reports a change.
//!      - Success: emit a notification and poll again.
//!      - Failure: back off (`BackingOff`), then poll again.
//!      - Too many consecutive failures: give up (`Failed`).
//! 3. Stop at any time (-> `Idle`).

use std::fmt;

use rust_fsm::*;

// ------------------------------------------------------------------------------------------------
// States, Inputs, Outputs

/// Long-poll notifier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierState {
    /// Not polling.
    Idle,
    /// A long-poll request is in flight (or about to be issued).
    Polling,
    /// Waiting out the backoff delay after a failed long-poll request.
    BackingOff,
    /// The consecutive-failure ceiling was reached. Requires an explicit restart.
    Failed,
}

impl fmt::Display for NotifierState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// State machine transition inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Input {
    Start,
    PollSucceeded,
    PollFailed,
    FailureCeilingReached,
    BackoffElapsed,
    Stop,
}

/// State machine transition outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    IssueLongPoll,
    EmitNotification,
    ScheduleBackoff,
    EmitFailed,
    AbortInFlight,
}

#[derive(Debug)]
pub(crate) struct NotifierStateMachine;

impl StateMachineImpl for NotifierStateMachine {
    type Input = Input;
    type State = NotifierState;
    type Output = Output;

    const INITIAL_STATE: Self::State = NotifierState::Idle;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match (state, input) {
            // Idle
            (NotifierState::Idle, Input::Start) => Some(NotifierState::Polling),
            (NotifierState::Idle, Input::Stop) => Some(NotifierState::Idle),

            // Polling
            (NotifierState::Polling, Input::PollSucceeded) => Some(NotifierState::Polling),
            (NotifierState::Polling, Input::PollFailed) => Some(NotifierState::BackingOff),
            (NotifierState::Polling, Input::FailureCeilingReached) => Some(NotifierState::Failed),
            (NotifierState::Polling, Input::Stop) => Some(NotifierState::Idle),

            // BackingOff
            (NotifierState::BackingOff, Input::BackoffElapsed) => Some(NotifierState::Polling),
            (NotifierState::BackingOff, Input::Stop) => Some(NotifierState::Idle),

            // Failed
            (NotifierState::Failed, Input::Start) => Some(NotifierState::Polling),
            (NotifierState::Failed, Input::Stop) => Some(NotifierState::Idle),

            _ => None,
        }
    }

    fn output(state: &Self::State, input: &Self::Input) -> Option<Self::Output> {
        match (state, input) {
            (NotifierState::Idle, Input::Start) => Some(Output::IssueLongPoll),
            (NotifierState::Failed, Input::Start) => Some(Output::IssueLongPoll),

            (NotifierState::Polling, Input::PollSucceeded) => Some(Output::EmitNotification),
            (NotifierState::Polling, Input::PollFailed) => Some(Output::ScheduleBackoff),
            (NotifierState::Polling, Input::FailureCeilingReached) => Some(Output::EmitFailed),
            (NotifierState::Polling, Input::Stop) => Some(Output::AbortInFlight),

            (NotifierState::BackingOff, Input::BackoffElapsed) => Some(Output::IssueLongPoll),

            _ => None,
        }
    }
}

// ================================================================================================
// Tests
