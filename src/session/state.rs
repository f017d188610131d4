use serde::Serialize;

/// Setup progress of a session controller.
///
/// ```text
/// Uninitialized → SessionCreated → DevicesDiscovered → InputConfigured
///               → OutputConfigured → Running
/// ```
///
/// A failed step leaves the state at the last step that succeeded.
/// Switching cameras happens inside `Running`; `teardown` returns to
/// `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SessionState {
    Uninitialized,
    SessionCreated,
    DevicesDiscovered,
    InputConfigured,
    OutputConfigured,
    Running,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::SessionCreated => "session_created",
            Self::DevicesDiscovered => "devices_discovered",
            Self::InputConfigured => "input_configured",
            Self::OutputConfigured => "output_configured",
            Self::Running => "running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(SessionState::Uninitialized < SessionState::SessionCreated);
        assert!(SessionState::OutputConfigured < SessionState::Running);
        assert!(SessionState::Running.is_running());
        assert!(!SessionState::InputConfigured.is_running());
    }
}
