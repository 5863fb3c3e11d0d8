//! Connection lifecycle state machine
//!
//! Pure and synchronous: the run loop feeds it transport events and executes
//! the timer actions it returns. Every reconnect timer carries a generation
//! id, and only the outstanding id is honoured when it fires.

use crate::error::ConnectionError;
use serde::Serialize;
use std::time::Duration;

/// Connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Initial phase, nothing attempted yet
    Disconnected,
    /// Connect attempt in flight
    Connecting,
    /// Transport open, frames flowing
    Connected,
    /// Waiting for the reconnect timer
    ReconnectScheduled,
    /// Shut down; terminal
    Stopped,
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: ConnectionPhase) -> Vec<ConnectionPhase> {
    use ConnectionPhase as P;
    match from {
        P::Disconnected => vec![P::Connecting, P::Stopped],
        P::Connecting => vec![P::Connected, P::ReconnectScheduled, P::Stopped],
        P::Connected => vec![P::ReconnectScheduled, P::Stopped],
        P::ReconnectScheduled => vec![P::Connecting, P::Stopped],
        P::Stopped => vec![],
    }
}

/// Validates a phase transition
///
/// # Errors
/// `ConnectionError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(
    from: ConnectionPhase,
    to: ConnectionPhase,
) -> Result<(), ConnectionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ConnectionError::IllegalTransition { from, to })
    }
}

/// Generation id of a reconnect timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Timer the caller must arm after a connection loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectTimer {
    /// Generation to pass back to `timer_fired`
    pub id: TimerId,
    /// How long to wait before firing
    pub delay: Duration,
}

/// Owns the connect/reconnect lifecycle of one client
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    phase: ConnectionPhase,
    reconnect_delay: Duration,
    pending_timer: Option<TimerId>,
    next_timer: u64,
    connect_attempts: u64,
    reconnects: u64,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` phase
    #[inline]
    #[must_use]
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            reconnect_delay,
            pending_timer: None,
            next_timer: 0,
            connect_attempts: 0,
            reconnects: 0,
        }
    }

    /// Start a connect attempt
    ///
    /// Cancels any outstanding reconnect timer and returns its id so the
    /// caller can drop it.
    ///
    /// # Errors
    /// `IllegalTransition` unless `Disconnected` or `ReconnectScheduled`
    pub fn begin_connect(&mut self) -> Result<Option<TimerId>, ConnectionError> {
        self.transition(ConnectionPhase::Connecting)?;
        self.connect_attempts += 1;
        Ok(self.pending_timer.take())
    }

    /// Transport reported a successful open
    ///
    /// # Errors
    /// `IllegalTransition` unless `Connecting`
    pub fn opened(&mut self) -> Result<Option<TimerId>, ConnectionError> {
        self.transition(ConnectionPhase::Connected)?;
        if self.connect_attempts > 1 {
            self.reconnects += 1;
        }
        Ok(self.pending_timer.take())
    }

    /// Live connection closed or hit a fatal error
    ///
    /// # Errors
    /// `IllegalTransition` unless `Connected`
    pub fn closed(&mut self) -> Result<ReconnectTimer, ConnectionError> {
        if self.phase != ConnectionPhase::Connected {
            return Err(ConnectionError::IllegalTransition {
                from: self.phase,
                to: ConnectionPhase::ReconnectScheduled,
            });
        }
        self.schedule_reconnect()
    }

    /// Connect attempt failed to establish
    ///
    /// # Errors
    /// `IllegalTransition` unless `Connecting`
    pub fn connect_failed(&mut self) -> Result<ReconnectTimer, ConnectionError> {
        if self.phase != ConnectionPhase::Connecting {
            return Err(ConnectionError::IllegalTransition {
                from: self.phase,
                to: ConnectionPhase::ReconnectScheduled,
            });
        }
        self.schedule_reconnect()
    }

    /// Reconnect timer expired
    ///
    /// Returns `false` and leaves state untouched for a stale timer.
    ///
    /// # Errors
    /// `ConnectionError::Stopped` after shutdown
    pub fn timer_fired(&mut self, timer: TimerId) -> Result<bool, ConnectionError> {
        if self.phase == ConnectionPhase::Stopped {
            return Err(ConnectionError::Stopped);
        }
        if self.pending_timer != Some(timer) {
            tracing::debug!(timer = timer.0, "ignoring stale reconnect timer");
            return Ok(false);
        }
        self.begin_connect()?;
        Ok(true)
    }

    /// Enter the terminal phase; idempotent
    ///
    /// Returns the reconnect timer that must be cancelled, if any.
    pub fn shutdown(&mut self) -> Option<TimerId> {
        if self.phase != ConnectionPhase::Stopped {
            tracing::debug!(from = ?self.phase, "connection manager stopped");
            self.phase = ConnectionPhase::Stopped;
        }
        self.pending_timer.take()
    }

    fn schedule_reconnect(&mut self) -> Result<ReconnectTimer, ConnectionError> {
        self.transition(ConnectionPhase::ReconnectScheduled)?;
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending_timer = Some(id);
        Ok(ReconnectTimer {
            id,
            delay: self.reconnect_delay,
        })
    }

    fn transition(&mut self, to: ConnectionPhase) -> Result<(), ConnectionError> {
        validate_transition(self.phase, to)?;
        tracing::trace!(from = ?self.phase, to = ?to, "connection transition");
        self.phase = to;
        Ok(())
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// `true` only in `Connected`
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Outstanding reconnect timer
    #[inline]
    #[must_use]
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    /// Total connect attempts started
    #[inline]
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Successful opens after the first attempt
    #[inline]
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Fixed reconnect delay
    #[inline]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_RECONNECT_DELAY_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_disconnected() {
        let manager = ConnectionManager::default();
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
        assert!(!manager.is_connected());
        assert_eq!(manager.reconnect_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn open_then_close_arms_timer() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        manager.opened().unwrap();
        assert!(manager.is_connected());

        let timer = manager.closed().unwrap();
        assert_eq!(manager.phase(), ConnectionPhase::ReconnectScheduled);
        assert!(!manager.is_connected());
        assert_eq!(timer.delay, Duration::from_millis(3000));
        assert_eq!(manager.pending_timer(), Some(timer.id));
    }

    #[test]
    fn failed_connect_arms_timer() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        let timer = manager.connect_failed().unwrap();
        assert_eq!(manager.phase(), ConnectionPhase::ReconnectScheduled);
        assert!(manager.timer_fired(timer.id).unwrap());
        assert_eq!(manager.phase(), ConnectionPhase::Connecting);
        assert_eq!(manager.connect_attempts(), 2);
    }

    #[test]
    fn timer_fires_once() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        manager.opened().unwrap();
        let timer = manager.closed().unwrap();

        assert!(manager.timer_fired(timer.id).unwrap());
        manager.opened().unwrap();
        assert_eq!(manager.reconnects(), 1);

        // Same timer firing again is stale
        assert!(!manager.timer_fired(timer.id).unwrap());
        assert!(manager.is_connected());
    }

    #[test]
    fn new_attempt_cancels_pending_timer() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        let timer = manager.connect_failed().unwrap();

        let cancelled = manager.begin_connect().unwrap();
        assert_eq!(cancelled, Some(timer.id));
        assert!(manager.pending_timer().is_none());
        assert!(!manager.timer_fired(timer.id).unwrap());
        assert_eq!(manager.phase(), ConnectionPhase::Connecting);
    }

    #[test]
    fn timer_ids_are_unique() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        let first = manager.connect_failed().unwrap();
        manager.timer_fired(first.id).unwrap();
        let second = manager.connect_failed().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn illegal_events_leave_state_unchanged() {
        let mut manager = ConnectionManager::default();
        assert!(manager.opened().is_err());
        assert!(manager.closed().is_err());
        assert!(manager.connect_failed().is_err());
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

        manager.begin_connect().unwrap();
        assert!(manager.begin_connect().is_err());
        assert!(manager.closed().is_err());
        assert_eq!(manager.phase(), ConnectionPhase::Connecting);
    }

    #[test]
    fn shutdown_is_idempotent_and_cancels() {
        let mut manager = ConnectionManager::default();
        manager.begin_connect().unwrap();
        let timer = manager.connect_failed().unwrap();

        assert_eq!(manager.shutdown(), Some(timer.id));
        assert_eq!(manager.shutdown(), None);
        assert_eq!(manager.phase(), ConnectionPhase::Stopped);
        assert_eq!(manager.timer_fired(timer.id), Err(ConnectionError::Stopped));
        assert!(manager.begin_connect().is_err());
    }

    #[test]
    fn transition_table() {
        use ConnectionPhase as P;
        assert!(validate_transition(P::Disconnected, P::Connecting).is_ok());
        assert!(validate_transition(P::Connected, P::ReconnectScheduled).is_ok());
        assert!(validate_transition(P::Disconnected, P::Connected).is_err());
        assert!(validate_transition(P::Connected, P::Connecting).is_err());
        assert!(allowed_transitions(P::Stopped).is_empty());
    }

    #[derive(Debug, Clone, Copy)]
    enum Event {
        BeginConnect,
        Opened,
        Closed,
        ConnectFailed,
        FirePending,
        FireStale(usize),
        Shutdown,
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            Just(Event::BeginConnect),
            Just(Event::Opened),
            Just(Event::Closed),
            Just(Event::ConnectFailed),
            Just(Event::FirePending),
            any::<usize>().prop_map(Event::FireStale),
            Just(Event::Shutdown),
        ]
    }

    proptest! {
        #[test]
        fn prop_stale_timers_never_fire(events in proptest::collection::vec(event(), 1..200)) {
            let mut manager = ConnectionManager::default();
            let mut issued: Vec<TimerId> = Vec::new();

            for event in events {
                match event {
                    Event::BeginConnect => { let _ = manager.begin_connect(); }
                    Event::Opened => { let _ = manager.opened(); }
                    Event::Closed => {
                        if let Ok(timer) = manager.closed() {
                            issued.push(timer.id);
                        }
                    }
                    Event::ConnectFailed => {
                        if let Ok(timer) = manager.connect_failed() {
                            issued.push(timer.id);
                        }
                    }
                    Event::FirePending => {
                        if let Some(id) = manager.pending_timer() {
                            prop_assert!(manager.timer_fired(id).unwrap());
                            prop_assert_eq!(manager.phase(), ConnectionPhase::Connecting);
                        }
                    }
                    Event::FireStale(pick) => {
                        if !issued.is_empty() {
                            let id = issued[pick % issued.len()];
                            if manager.pending_timer() != Some(id) {
                                let before = manager.clone();
                                let fired = manager.timer_fired(id);
                                prop_assert!(!matches!(fired, Ok(true)));
                                prop_assert_eq!(manager.phase(), before.phase());
                                prop_assert_eq!(manager.pending_timer(), before.pending_timer());
                                prop_assert_eq!(manager.connect_attempts(), before.connect_attempts());
                            }
                        }
                    }
                    Event::Shutdown => { let _ = manager.shutdown(); }
                }

                prop_assert_eq!(
                    manager.pending_timer().is_some(),
                    manager.phase() == ConnectionPhase::ReconnectScheduled
                );
                prop_assert_eq!(manager.is_connected(), manager.phase() == ConnectionPhase::Connected);
            }
        }
    }
}
