//! State machine transition tests.
//!
//! Verifies the TaskStatus state machine against the full 7x7 transition
//! matrix: 12 valid transitions, 7 self-transition rejections, and every
//! other pair rejected.

// Imports are in sub-modules to avoid ambiguity with pretty_assertions.

// ─── is_terminal / holds_engine Tests ───────────────────────────────────────

mod classification {
    use engine_tasks::TaskStatus;

    #[test]
    fn only_completed_failed_stopped_are_terminal() {
        let terminal: Vec<TaskStatus> = TaskStatus::ALL
            .into_iter()
            .filter(TaskStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Stopped]
        );
    }

    #[test]
    fn only_running_and_paused_hold_an_engine() {
        let owned: Vec<TaskStatus> = TaskStatus::ALL
            .into_iter()
            .filter(TaskStatus::holds_engine)
            .collect();
        assert_eq!(owned, vec![TaskStatus::Running, TaskStatus::Paused]);
    }
}

// ─── Transition Matrix ──────────────────────────────────────────────────────

mod matrix {
    use engine_tasks::TaskStatus::{self, *};
    use pretty_assertions::assert_eq;

    const VALID: [(TaskStatus, TaskStatus); 12] = [
        (Created, Scheduled),
        (Created, Stopped),
        (Scheduled, Running),
        (Scheduled, Stopped),
        (Running, Paused),
        (Running, Completed),
        (Running, Failed),
        (Running, Stopped),
        (Paused, Running),
        (Paused, Completed),
        (Paused, Failed),
        (Paused, Stopped),
    ];

    #[test]
    fn exactly_the_listed_transitions_are_valid() {
        let mut valid = Vec::new();
        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                if from.can_transition_to(&to) {
                    valid.push((from, to));
                }
            }
        }
        assert_eq!(valid, VALID.to_vec());
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in TaskStatus::ALL {
            assert!(!status.can_transition_to(&status), "{status} -> {status}");
        }
    }

    #[test]
    fn claim_is_the_only_way_into_running_from_a_fresh_task() {
        assert!(!Created.can_transition_to(&Running));
        assert!(Scheduled.can_transition_to(&Running));
    }
}

// ─── validate_transition Errors ─────────────────────────────────────────────

mod validate {
    use engine_tasks::{TaskError, TaskErrorKind, TaskStatus};

    #[test]
    fn rejected_transition_names_both_ends() {
        let err = TaskStatus::Failed
            .validate_transition("t-1", &TaskStatus::Running)
            .unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::InvalidTransition);
        match err {
            TaskError::InvalidTransition { task_id, from, to } => {
                assert_eq!(task_id, "t-1");
                assert_eq!(from, TaskStatus::Failed);
                assert_eq!(to, TaskStatus::Running);
            },
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn paused_task_can_be_stopped() {
        assert!(TaskStatus::Paused
            .validate_transition("t-2", &TaskStatus::Stopped)
            .is_ok());
    }
}

// ─── Wire Form ──────────────────────────────────────────────────────────────

mod wire {
    use engine_tasks::TaskStatus;
    use serde_json::json;

    #[test]
    fn statuses_serialize_upper_case() {
        for status in TaskStatus::ALL {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
            assert_eq!(status.to_string(), status.as_str());
        }
        assert_eq!(
            serde_json::to_value(TaskStatus::Scheduled).unwrap(),
            json!("SCHEDULED")
        );
    }

    #[test]
    fn unknown_status_fails_to_parse() {
        assert!(serde_json::from_value::<TaskStatus>(json!("WORKING")).is_err());
        assert!(serde_json::from_value::<TaskStatus>(json!("running")).is_err());
    }
}
