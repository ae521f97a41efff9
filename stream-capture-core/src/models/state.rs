/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → connecting → recording ⇄ paused
///            ↓            ↓
///          error ───────→ idle (on stop)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Recording,
    Paused,
    Error(String),
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Recording or paused: a recording is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }

    /// Short human-readable label used as the default status text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Recording => "Recording",
            Self::Paused => "Paused",
            Self::Error(_) => "Error",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}
