use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No monitor is around; the service exits once the deadline passes.
    Idle,
    Active,
    Terminating,
}

/// What the service has to do after a change in monitor presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Nothing,
    /// The first monitor ever showed up: export the watcher and claim its name.
    Activate,
    /// A monitor came back while counting down.
    CountdownCancelled,
    /// The last monitor left.
    CountdownArmed,
}

/// Decides whether the service should be running, based on the presence of status icon
/// monitors.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
    deadline: Option<Instant>,
    idle_timeout: Duration,
    activated: bool,
}

impl Lifecycle {
    /// Start out idle, counting down from `now`.
    pub fn new(idle_timeout: Duration, now: Instant) -> Lifecycle {
        Lifecycle { phase: Phase::Idle, deadline: Some(now + idle_timeout), idle_timeout, activated: false }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the watcher has been exported at some point.
    pub fn activated(&self) -> bool {
        self.activated
    }

    /// When the service exits unless a monitor shows up.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn monitors_changed(&mut self, present: bool, now: Instant) -> Transition {
        match (self.phase, present) {
            (Phase::Idle, true) => {
                self.phase = Phase::Active;
                self.deadline = None;
                if std::mem::replace(&mut self.activated, true) {
                    Transition::CountdownCancelled
                } else {
                    Transition::Activate
                }
            }
            (Phase::Active, false) => {
                self.phase = Phase::Idle;
                self.deadline = Some(now + self.idle_timeout);
                Transition::CountdownArmed
            }
            _ => Transition::Nothing,
        }
    }

    /// Move to [`Phase::Terminating`] if the deadline has passed. Returns whether it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if self.phase == Phase::Idle && deadline <= now => {
                self.terminate();
                true
            }
            _ => false,
        }
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminating;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_startup_without_monitors() {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(TIMEOUT, start);

        assert_eq!(lifecycle.phase(), Phase::Idle);
        assert_eq!(lifecycle.deadline(), Some(start + TIMEOUT));
        assert!(!lifecycle.expire(start + Duration::from_secs(29)));
        assert!(lifecycle.expire(start + TIMEOUT));
        assert_eq!(lifecycle.phase(), Phase::Terminating);
        assert!(!lifecycle.activated());
    }

    #[test]
    fn test_first_monitor_activates_once() {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(TIMEOUT, start);

        assert_eq!(lifecycle.monitors_changed(true, start), Transition::Activate);
        assert_eq!(lifecycle.monitors_changed(true, start), Transition::Nothing);
        assert_eq!(lifecycle.deadline(), None);
        assert!(lifecycle.activated());
        assert!(!lifecycle.expire(start + TIMEOUT * 10));
    }

    #[test]
    fn test_monitor_returning_cancels_countdown() {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(TIMEOUT, start);
        lifecycle.monitors_changed(true, start);

        let left = start + Duration::from_secs(100);
        assert_eq!(lifecycle.monitors_changed(false, left), Transition::CountdownArmed);
        assert_eq!(lifecycle.deadline(), Some(left + TIMEOUT));
        // another monitor leaving doesn't push the deadline back
        assert_eq!(lifecycle.monitors_changed(false, left + Duration::from_secs(5)), Transition::Nothing);
        assert_eq!(lifecycle.deadline(), Some(left + TIMEOUT));

        assert_eq!(lifecycle.monitors_changed(true, left + Duration::from_secs(10)), Transition::CountdownCancelled);
        assert!(!lifecycle.expire(left + TIMEOUT));
        assert_eq!(lifecycle.phase(), Phase::Active);
    }

    #[test]
    fn test_countdown_expires_without_monitors() {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(TIMEOUT, start);
        lifecycle.monitors_changed(true, start);
        lifecycle.monitors_changed(false, start);

        assert!(lifecycle.expire(start + TIMEOUT));
        assert_eq!(lifecycle.phase(), Phase::Terminating);
        assert_eq!(lifecycle.monitors_changed(true, start + TIMEOUT), Transition::Nothing);
    }

    #[test]
    fn test_terminate_overrides_everything() {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(TIMEOUT, start);
        lifecycle.monitors_changed(true, start);

        lifecycle.terminate();
        assert_eq!(lifecycle.phase(), Phase::Terminating);
        assert_eq!(lifecycle.deadline(), None);
    }
}
