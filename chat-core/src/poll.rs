//! Poll scheduling state machine for FlowChat.
//!
//! This module provides a pure, side-effect-free state machine for the
//! incremental poller. It takes events as input and produces a new state
//! plus a list of actions to execute.
//!
//! The actual I/O (fetching, arming timers) is performed by flowchat-client,
//! not by this module. This enables instant unit testing without timers.
//!
//! ```text
//!          Start                Suspend
//!   Idle ────────► Active ◄──────────────► Suspended
//!    ▲               │        Resume          │
//!    └───── Stop / 401 ◄──────────────────────┘
//! ```

use std::time::Duration;

/// Reference poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Scheduling phase of the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Not polling. Initial state, and terminal after `Stop` until the next
    /// `Start`.
    Idle,
    /// Timer armed, ticks fetch.
    Active,
    /// Page hidden; timer cancelled until `Resume`.
    Suspended,
}

/// Poller state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    phase: PollPhase,
    /// A fetch has been issued and has not completed yet.
    in_flight: bool,
    interval: Duration,
}

impl PollState {
    /// Create an idle poller that will tick every `interval` once started.
    pub fn new(interval: Duration) -> Self {
        Self {
            phase: PollPhase::Idle,
            in_flight: false,
            interval,
        }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (flowchat-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: PollEvent) -> (Self, Vec<PollAction>) {
        let interval = self.interval;
        match (self.phase, event) {
            // From Idle
            (PollPhase::Idle, PollEvent::Start) => {
                let mut actions = Vec::with_capacity(2);
                if !self.in_flight {
                    actions.push(PollAction::Fetch);
                }
                actions.push(PollAction::ArmTimer { interval });
                (
                    Self {
                        phase: PollPhase::Active,
                        in_flight: true,
                        ..self
                    },
                    actions,
                )
            }

            // From Active
            (PollPhase::Active, PollEvent::Tick) if !self.in_flight => (
                Self {
                    in_flight: true,
                    ..self
                },
                vec![PollAction::Fetch],
            ),
            (PollPhase::Active, PollEvent::Suspend) => (
                Self {
                    phase: PollPhase::Suspended,
                    ..self
                },
                vec![PollAction::CancelTimer],
            ),

            // From Suspended
            (PollPhase::Suspended, PollEvent::Resume) => {
                let mut actions = Vec::with_capacity(2);
                if !self.in_flight {
                    actions.push(PollAction::Fetch);
                }
                actions.push(PollAction::ArmTimer { interval });
                (
                    Self {
                        phase: PollPhase::Active,
                        in_flight: true,
                        ..self
                    },
                    actions,
                )
            }

            // Completion is accepted in every phase: a fetch issued before a
            // suspend or stop still finishes.
            (_, PollEvent::FetchCompleted) => (
                Self {
                    in_flight: false,
                    ..self
                },
                vec![],
            ),
            (PollPhase::Active | PollPhase::Suspended, PollEvent::Unauthorized) => (
                Self {
                    phase: PollPhase::Idle,
                    in_flight: false,
                    ..self
                },
                vec![PollAction::CancelTimer, PollAction::EmitSessionInvalid],
            ),
            (PollPhase::Idle, PollEvent::Unauthorized) => (
                Self {
                    in_flight: false,
                    ..self
                },
                vec![],
            ),

            (PollPhase::Active | PollPhase::Suspended, PollEvent::Stop) => (
                Self {
                    phase: PollPhase::Idle,
                    ..self
                },
                vec![PollAction::CancelTimer],
            ),

            // Skipped ticks, repeated suspends, resumes while active, and
            // everything while idle - stay in current state
            (_, _) => (self, vec![]),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Check if a fetch is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Check if the timer should be running.
    pub fn is_active(&self) -> bool {
        self.phase == PollPhase::Active
    }

    /// Configured tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Events that drive the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Begin polling (session established).
    Start,
    /// Interval timer fired.
    Tick,
    /// The outstanding fetch finished, successfully or with a transient error.
    FetchCompleted,
    /// The outstanding fetch was rejected with HTTP 401.
    Unauthorized,
    /// Page became hidden.
    Suspend,
    /// Page became visible.
    Resume,
    /// Stop polling (session ended or shutdown).
    Stop,
}

/// Actions to be executed by flowchat-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Fetch messages since the current cursor.
    Fetch,
    /// (Re)arm the periodic timer; the first tick fires one interval from now.
    ArmTimer {
        /// Tick period.
        interval: Duration,
    },
    /// Cancel the periodic timer.
    CancelTimer,
    /// Tell the session owner that the credential was rejected.
    EmitSessionInvalid,
}
