//! Pure station connection state machine
//!
//! `StationMachine::handle` is the whole transition function: it takes one
//! radio event, updates [`ConnectionState`] and returns at most one
//! [`Action`] for the dispatcher to perform. It never touches the radio or
//! the event group itself, so it is tested without either.

use core::net::Ipv4Addr;

use super::{ConnectionState, Phase, StationEvent, TerminalSignal};

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Ask the radio to (re)join the configured access point.
    IssueConnect,
    /// Latch a terminal signal for the current attempt.
    Signal(TerminalSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationMachine {
    max_retries: u32,
    state: ConnectionState,
    phase: Phase,
    /// Terminal signal already emitted for the current attempt.
    latched: Option<TerminalSignal>,
}

impl StationMachine {
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            state: ConnectionState::new(),
            phase: Phase::Idle,
            latched: None,
        }
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn latched(&self) -> Option<TerminalSignal> {
        self.latched
    }

    /// Prepare for a new call to `Station::connect`.
    ///
    /// Returns the request the caller must issue itself, if any. An attempt
    /// already in flight is joined with its remaining budget, and a radio
    /// that is not running yet issues the first request from its start event.
    pub fn begin_attempt(&mut self, radio_running: bool) -> Option<Action> {
        self.latched = None;
        match self.phase {
            Phase::Connecting | Phase::Retrying => None,
            Phase::Idle => {
                self.state.retry_count = 0;
                None
            }
            Phase::Stopped if !radio_running => {
                self.state.retry_count = 0;
                None
            }
            Phase::Stopped | Phase::Connected | Phase::Failed => {
                self.state.retry_count = 0;
                self.phase = Phase::Connecting;
                Some(Action::IssueConnect)
            }
        }
    }

    /// The radio is being shut down on request. Link loss reported from
    /// here on is expected and does not retry.
    pub fn stop(&mut self) {
        self.state.connected = false;
        self.state.retry_count = 0;
        self.latched = None;
        self.phase = Phase::Stopped;
    }

    pub fn handle(&mut self, event: StationEvent) -> Option<Action> {
        match event {
            StationEvent::Started => {
                self.phase = Phase::Connecting;
                Some(Action::IssueConnect)
            }
            StationEvent::Disconnected => self.on_disconnected(),
            StationEvent::GotAddress(address) => self.on_got_address(address),
        }
    }

    fn on_disconnected(&mut self) -> Option<Action> {
        // Written even when the link never came up.
        self.state.connected = false;

        if self.phase == Phase::Stopped {
            return None;
        }

        if self.state.retry_count < self.max_retries {
            self.state.retry_count += 1;
            self.phase = Phase::Retrying;
            log::info!(
                "Retrying connection to the access point ({}/{})",
                self.state.retry_count,
                self.max_retries
            );
            Some(Action::IssueConnect)
        } else {
            self.phase = Phase::Failed;
            log::info!("Connection to the access point failed");
            self.latch(TerminalSignal::Failed)
        }
    }

    fn on_got_address(&mut self, address: Ipv4Addr) -> Option<Action> {
        log::info!("Got IP: {}", address);
        self.state.retry_count = 0;
        self.state.connected = true;
        self.state.assigned_address = Some(address);
        self.phase = Phase::Connected;
        self.latch(TerminalSignal::Connected)
    }

    fn latch(&mut self, signal: TerminalSignal) -> Option<Action> {
        if self.latched.is_some() {
            return None;
        }
        self.latched = Some(signal);
        Some(Action::Signal(signal))
    }
}
