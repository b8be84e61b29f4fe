//! Exit policy: when a sync run is allowed to stop on its own.
//!
//! Derived from the sync mode and the caller's idle-exit duration:
//!
//! | Mode      | Idle window                       | Stops on history complete |
//! |-----------|-----------------------------------|---------------------------|
//! | Bootstrap | `idle_exit` (none if zero)        | only without idle window  |
//! | Once      | `min(idle_exit, ONCE_GRACE)`      | yes                       |
//! | Follow    | none                              | no                        |

use std::time::Duration;
use sync_types::SyncMode;

/// Longest quiet period a `Once` run waits before finishing.
pub const ONCE_GRACE: Duration = Duration::from_secs(2);

/// When a run may finish without being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
    /// Mode the policy was derived from.
    pub mode: SyncMode,
    /// Finish after this long without a stored message.
    pub idle_window: Option<Duration>,
    /// Finish as soon as the session reports the backfill complete.
    pub exit_on_history_complete: bool,
}

impl ExitPolicy {
    /// Derive the policy for a mode.
    pub fn for_mode(mode: SyncMode, idle_exit: Duration) -> Self {
        match mode {
            SyncMode::Bootstrap => {
                let idle_window = (!idle_exit.is_zero()).then_some(idle_exit);
                Self {
                    mode,
                    idle_window,
                    exit_on_history_complete: idle_window.is_none(),
                }
            }
            SyncMode::Once => {
                let window = if idle_exit.is_zero() {
                    ONCE_GRACE
                } else {
                    idle_exit.min(ONCE_GRACE)
                };
                Self {
                    mode,
                    idle_window: Some(window),
                    exit_on_history_complete: true,
                }
            }
            SyncMode::Follow => Self {
                mode,
                idle_window: None,
                exit_on_history_complete: false,
            },
        }
    }

    /// True if only cancellation can end the run.
    pub fn is_unbounded(&self) -> bool {
        !self.mode.is_bounded()
    }

    /// Deadline for the idle timer given the last activity.
    ///
    /// Generic over the clock so both `std` and `tokio` instants work.
    /// `None` means the run never times out on idle.
    pub fn deadline_after<I>(&self, last_activity: I) -> Option<I>
    where
        I: std::ops::Add<Duration, Output = I>,
    {
        self.idle_window.map(|window| last_activity + window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn bootstrap_uses_idle_exit() {
        let policy = ExitPolicy::for_mode(SyncMode::Bootstrap, Duration::from_secs(30));
        assert_eq!(policy.idle_window, Some(Duration::from_secs(30)));
        assert!(!policy.exit_on_history_complete);
        assert!(!policy.is_unbounded());
    }

    #[test]
    fn bootstrap_zero_idle_waits_for_history() {
        let policy = ExitPolicy::for_mode(SyncMode::Bootstrap, Duration::ZERO);
        assert_eq!(policy.idle_window, None);
        assert!(policy.exit_on_history_complete);
    }

    #[test]
    fn once_caps_idle_at_grace() {
        let policy = ExitPolicy::for_mode(SyncMode::Once, Duration::from_secs(30));
        assert_eq!(policy.idle_window, Some(ONCE_GRACE));
        assert!(policy.exit_on_history_complete);

        let short = ExitPolicy::for_mode(SyncMode::Once, Duration::from_millis(300));
        assert_eq!(short.idle_window, Some(Duration::from_millis(300)));

        let unset = ExitPolicy::for_mode(SyncMode::Once, Duration::ZERO);
        assert_eq!(unset.idle_window, Some(ONCE_GRACE));
    }

    #[test]
    fn follow_ignores_idle_exit() {
        let policy = ExitPolicy::for_mode(SyncMode::Follow, Duration::from_secs(5));
        assert_eq!(policy.idle_window, None);
        assert!(!policy.exit_on_history_complete);
        assert!(policy.is_unbounded());
        assert_eq!(policy.deadline_after(Instant::now()), None);
    }

    #[test]
    fn deadline_is_last_activity_plus_window() {
        let policy = ExitPolicy::for_mode(SyncMode::Bootstrap, Duration::from_millis(500));
        let now = Instant::now();
        assert_eq!(
            policy.deadline_after(now),
            Some(now + Duration::from_millis(500))
        );
    }
}
