/// Lifecycle of a change feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Uninitialized,
    PushActive,
    PullActive,
    Stopped,
    Failed,
}

impl FeedState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Stopped | FeedState::Failed)
    }
}

/// Transition rules for [`FeedState`].
///
/// - `Uninitialized` -> `PushActive` or `PullActive` on start
/// - `PushActive` -> `PullActive` on the first unsupported-push signal only;
///   a second one fails the feed
/// - any state -> `Stopped` on stop
/// - any live state -> `Failed` on an unrecoverable error
#[derive(Debug)]
pub(crate) struct FeedMachine {
    state: FeedState,
    fallback_spent: bool,
}

impl FeedMachine {
    pub fn new() -> Self {
        Self {
            state: FeedState::Uninitialized,
            fallback_spent: false,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn start(&mut self, push_supported: bool) -> FeedState {
        if self.state == FeedState::Uninitialized {
            self.state = if push_supported {
                FeedState::PushActive
            } else {
                FeedState::PullActive
            };
        }
        self.state
    }

    pub fn push_unsupported(&mut self) -> FeedState {
        if self.state != FeedState::PushActive {
            return self.state;
        }
        self.state = if self.fallback_spent {
            FeedState::Failed
        } else {
            self.fallback_spent = true;
            FeedState::PullActive
        };
        self.state
    }

    pub fn stop(&mut self) -> FeedState {
        self.state = FeedState::Stopped;
        self.state
    }

    pub fn fail(&mut self) -> FeedState {
        if !self.state.is_terminal() {
            self.state = FeedState::Failed;
        }
        self.state
    }

    /// Re-enters push on the same subscription, keeping the spent fallback.
    #[cfg(test)]
    pub fn resume_push(&mut self) {
        self.state = FeedState::PushActive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_picks_transport() {
        assert_eq!(FeedMachine::new().start(true), FeedState::PushActive);
        assert_eq!(FeedMachine::new().start(false), FeedState::PullActive);
    }

    #[test]
    fn test_start_is_a_no_op_once_started() {
        let mut machine = FeedMachine::new();
        machine.start(false);
        assert_eq!(machine.start(true), FeedState::PullActive);
    }

    #[test]
    fn test_fallback_happens_exactly_once() {
        let mut machine = FeedMachine::new();
        machine.start(true);
        assert_eq!(machine.push_unsupported(), FeedState::PullActive);

        machine.resume_push();
        assert_eq!(machine.push_unsupported(), FeedState::Failed);
    }

    #[test]
    fn test_unsupported_signal_outside_push_is_ignored() {
        let mut machine = FeedMachine::new();
        machine.start(false);
        assert_eq!(machine.push_unsupported(), FeedState::PullActive);
    }

    #[test]
    fn test_stop_wins_from_any_state() {
        for push in [true, false] {
            let mut machine = FeedMachine::new();
            machine.start(push);
            assert_eq!(machine.stop(), FeedState::Stopped);
        }

        let mut failed = FeedMachine::new();
        failed.start(false);
        failed.fail();
        assert_eq!(failed.stop(), FeedState::Stopped);
    }

    #[test]
    fn test_fail_does_not_override_stop() {
        let mut machine = FeedMachine::new();
        machine.start(true);
        machine.stop();
        assert_eq!(machine.fail(), FeedState::Stopped);
        assert!(machine.state().is_terminal());
    }
}
