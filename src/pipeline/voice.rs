//! Voice selection — a pure mapping from subject line to synthesis voice.

use serde::Serialize;

/// Closed set of synthesis voices the speech oracle accepts.
///
/// Serializes to the lowercase wire name (`"onyx"` etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    #[default]
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    /// Fixed scan order: the first of these found in the subject wins,
    /// regardless of where it appears in the subject itself.
    pub const PRIORITY: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }

    /// Pick the voice named in the subject (case-insensitive substring);
    /// `onyx` when none is named. Deterministic, no side effects.
    pub fn from_subject(subject: &str) -> Self {
        let lowered = subject.to_lowercase();
        Self::PRIORITY
            .iter()
            .copied()
            .find(|voice| lowered.contains(voice.as_str()))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
