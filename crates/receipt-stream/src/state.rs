use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one submitted job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(JobState, &[JobState])] = &[
    (JobState::Idle, &[JobState::Requesting]),
    (
        JobState::Requesting,
        &[JobState::Streaming, JobState::Failed, JobState::Cancelled],
    ),
    (
        JobState::Streaming,
        &[JobState::Completed, JobState::Failed, JobState::Cancelled],
    ),
    // Completed, Failed and Cancelled are terminal
];

pub fn is_valid_transition(from: JobState, to: JobState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Requesting => "requesting",
            JobState::Streaming => "streaming",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 6] = [
        JobState::Idle,
        JobState::Requesting,
        JobState::Streaming,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    #[test]
    fn happy_path_is_valid() {
        assert!(is_valid_transition(JobState::Idle, JobState::Requesting));
        assert!(is_valid_transition(JobState::Requesting, JobState::Streaming));
        assert!(is_valid_transition(JobState::Streaming, JobState::Completed));
    }

    #[test]
    fn start_failure_and_cancel_paths() {
        assert!(is_valid_transition(JobState::Requesting, JobState::Failed));
        assert!(is_valid_transition(JobState::Requesting, JobState::Cancelled));
        assert!(is_valid_transition(JobState::Streaming, JobState::Cancelled));
        assert!(!is_valid_transition(JobState::Idle, JobState::Cancelled));
        assert!(!is_valid_transition(JobState::Requesting, JobState::Completed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!is_valid_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&JobState::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
