//! Job state codes carried in V2+ response frames.

/// Terminal and in-flight states of one compile-farm job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No job was constructed for the request (also the error-path default).
    NotFound,
    /// Job accepted, not yet running.
    Pending,
    /// Job is executing on a compile backend.
    Compiling,
    /// Job finished and produced a payload.
    Completed,
    /// The compile backend reported a failure.
    CompileError,
}

impl JobState {
    /// Wire code, the single byte prepended to V2+ response payloads.
    pub fn code(self) -> u8 {
        match self {
            JobState::NotFound => 0,
            JobState::Pending => 1,
            JobState::Compiling => 2,
            JobState::Completed => 3,
            JobState::CompileError => 4,
        }
    }

    /// Decode a wire code. Unknown codes map to `NotFound`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => JobState::Pending,
            2 => JobState::Compiling,
            3 => JobState::Completed,
            4 => JobState::CompileError,
            _ => JobState::NotFound,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::NotFound => "not found",
            JobState::Pending => "pending",
            JobState::Compiling => "compiling",
            JobState::Completed => "completed",
            JobState::CompileError => "compile error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for state in [
            JobState::NotFound,
            JobState::Pending,
            JobState::Compiling,
            JobState::Completed,
            JobState::CompileError,
        ] {
            assert_eq!(JobState::from_code(state.code()), state);
        }
    }

    #[test]
    fn test_unknown_code_is_not_found() {
        assert_eq!(JobState::from_code(250), JobState::NotFound);
    }
}
