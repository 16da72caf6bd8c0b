//! Reconnection state machine for the system stream.
//!
//! Pure transition logic with no I/O and no clock. The stream driver feeds it
//! events and performs the returned [`Action`].

use std::fmt;

use tracing::debug;

/// Connection state owned by the stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectScheduled => "reconnect_scheduled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the machine. Timer events carry the generation they were armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Start,
    ConnectSucceeded,
    ConnectFailed,
    Disconnected,
    TimerFired { generation: u64 },
    Shutdown,
}

/// What the driver has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a new connection; `attempt` numbers attempts from 1.
    Connect { attempt: u64 },
    /// Read frames from the live connection.
    Receive,
    /// Sleep for the reconnect delay, then fire `TimerFired { generation }`.
    ArmTimer { generation: u64 },
    /// Event did not apply in the current state.
    Ignore,
    /// Tear everything down.
    Stop,
}

#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u64,
    timer_generation: u64,
    stopped: bool,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            timer_generation: 0,
            stopped: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn handle(&mut self, event: LinkEvent) -> Action {
        if self.stopped {
            return Action::Ignore;
        }
        let before = self.state;
        let action = match (self.state, event) {
            (_, LinkEvent::Shutdown) => {
                self.stopped = true;
                self.state = ConnectionState::Disconnected;
                Action::Stop
            }
            (ConnectionState::Disconnected, LinkEvent::Start) => self.begin_connect(),
            (ConnectionState::Connecting, LinkEvent::ConnectSucceeded) => {
                self.state = ConnectionState::Connected;
                Action::Receive
            }
            (ConnectionState::Connecting, LinkEvent::ConnectFailed)
            | (ConnectionState::Connected, LinkEvent::Disconnected) => self.schedule_reconnect(),
            (ConnectionState::ReconnectScheduled, LinkEvent::TimerFired { generation })
                if generation == self.timer_generation =>
            {
                self.begin_connect()
            }
            _ => Action::Ignore,
        };
        if before != self.state {
            debug!("stream state {} -> {} on {:?}", before, self.state, event);
        }
        action
    }

    fn begin_connect(&mut self) -> Action {
        self.state = ConnectionState::Connecting;
        self.attempts += 1;
        Action::Connect {
            attempt: self.attempts,
        }
    }

    fn schedule_reconnect(&mut self) -> Action {
        self.state = ConnectionState::ReconnectScheduled;
        self.timer_generation += 1;
        Action::ArmTimer {
            generation: self.timer_generation,
        }
    }
}
