//! Consecutive error accounting for provider polling.

use tracing::debug;

/// Errors logged individually before the rest of a streak goes quiet.
const LOGGED_PER_STREAK: u32 = 3;

/// What the poll loop should do after a failed progress check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollVerdict {
    /// Keep polling and log the error
    Log,
    /// Keep polling without logging
    Quiet,
    /// The streak reached the budget; fail the job
    GiveUp,
}

/// Streak of failed progress polls against one provider job.
///
/// Any successful poll ends the streak.
#[derive(Debug)]
pub struct PollErrors {
    streak: u32,
    budget: u32,
}

impl PollErrors {
    pub fn new(budget: u32) -> Self {
        Self {
            streak: 0,
            budget: budget.max(1),
        }
    }

    pub fn reset(&mut self) {
        if self.streak > 0 {
            debug!(streak = self.streak, "Provider polling recovered");
        }
        self.streak = 0;
    }

    pub fn record(&mut self) -> PollVerdict {
        self.streak += 1;
        if self.streak >= self.budget {
            PollVerdict::GiveUp
        } else if self.streak <= LOGGED_PER_STREAK {
            PollVerdict::Log
        } else {
            PollVerdict::Quiet
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_reaches_budget() {
        let mut errors = PollErrors::new(5);
        assert_eq!(errors.record(), PollVerdict::Log);
        assert_eq!(errors.record(), PollVerdict::Log);
        assert_eq!(errors.record(), PollVerdict::Log);
        assert_eq!(errors.record(), PollVerdict::Quiet);
        assert_eq!(errors.record(), PollVerdict::GiveUp);
        assert_eq!(errors.streak(), 5);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut errors = PollErrors::new(2);
        assert_eq!(errors.record(), PollVerdict::Log);
        errors.reset();
        assert_eq!(errors.streak(), 0);
        assert_eq!(errors.record(), PollVerdict::Log);
        assert_eq!(errors.record(), PollVerdict::GiveUp);
    }

    #[test]
    fn test_zero_budget_gives_up_immediately() {
        let mut errors = PollErrors::new(0);
        assert_eq!(errors.record(), PollVerdict::GiveUp);
    }
}
