//! Results-view navigation guard.
//!
//! Rules, first match wins:
//! 1. Status is not a terminal success and the view is Results: go Home, latch.
//! 2. Status is idle, ready, running, queued, pending, failed or error: clear the latch.
//! 3. Status is a terminal success, latch clear, view not Results: go to Results, latch.
//!
//! Any other combination (including unknown statuses away from Results)
//! leaves everything as it is.

use super::state::View;
use crate::models::JobStatus;

fn resets_latch(status: &JobStatus) -> bool {
    matches!(
        status,
        JobStatus::Idle
            | JobStatus::Ready
            | JobStatus::Running
            | JobStatus::Queued
            | JobStatus::Pending
            | JobStatus::Failed
            | JobStatus::Error
    )
}

/// Pure guard step: the navigation to perform, if any, and the new latch.
pub fn decide(status: &JobStatus, view: View, latched: bool) -> (Option<View>, bool) {
    let success = status.is_terminal_success();
    if !success && view == View::Results {
        return (Some(View::Home), true);
    }
    if resets_latch(status) {
        return (None, false);
    }
    if success && !latched && view != View::Results {
        return (Some(View::Results), true);
    }
    (None, latched)
}

/// Guard with its latch
#[derive(Debug, Clone, Default)]
pub struct NavigationGuard {
    latched: bool,
}

impl NavigationGuard {
    /// Evaluate against the current status and view; returns where to go.
    pub fn evaluate(&mut self, status: &JobStatus, view: View) -> Option<View> {
        let (target, latched) = decide(status, view, self.latched);
        self.latched = latched;
        target
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed statuses through the guard, following its navigation.
    fn drive(guard: &mut NavigationGuard, view: &mut View, statuses: &[&str]) -> Vec<Option<View>> {
        statuses
            .iter()
            .map(|s| {
                let target = guard.evaluate(&JobStatus::from(*s), *view);
                if let Some(next) = target {
                    *view = next;
                }
                target
            })
            .collect()
    }

    #[test]
    fn test_success_navigates_once() {
        let mut guard = NavigationGuard::default();
        let mut view = View::Home;
        let actions = drive(&mut guard, &mut view, &["idle", "running", "running", "succeeded", "succeeded"]);
        assert_eq!(actions, vec![None, None, None, Some(View::Results), None]);
        assert_eq!(view, View::Results);
    }

    #[test]
    fn test_no_renavigation_after_leaving_results() {
        let mut guard = NavigationGuard::default();
        let mut view = View::Home;
        drive(&mut guard, &mut view, &["completed"]);
        assert_eq!(view, View::Results);

        view = View::Home;
        assert_eq!(drive(&mut guard, &mut view, &["completed", "done"]), vec![None, None]);

        // A new episode re-arms the guard.
        assert_eq!(
            drive(&mut guard, &mut view, &["running", "success"]),
            vec![None, Some(View::Results)]
        );
    }

    #[test]
    fn test_results_while_running_forces_home() {
        let mut guard = NavigationGuard::default();
        let mut view = View::Results;
        assert_eq!(drive(&mut guard, &mut view, &["running"]), vec![Some(View::Home)]);
        assert_eq!(view, View::Home);
        assert!(guard.is_latched());

        assert_eq!(drive(&mut guard, &mut view, &["running"]), vec![None]);
        assert!(!guard.is_latched());
    }

    #[test]
    fn test_unknown_status() {
        assert_eq!(decide(&JobStatus::from("cancelled"), View::Home, true), (None, true));
        assert_eq!(decide(&JobStatus::from("cancelled"), View::Home, false), (None, false));
        assert_eq!(
            decide(&JobStatus::from("cancelled"), View::Results, false),
            (Some(View::Home), true)
        );
    }

    #[test]
    fn test_failure_at_results() {
        assert_eq!(decide(&JobStatus::Failed, View::Results, false), (Some(View::Home), true));
        assert_eq!(decide(&JobStatus::Failed, View::Home, true), (None, false));
    }
}
