use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Create,
    Update,
    Info,
    Generic,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 5] =
        [Self::Create, Self::Update, Self::Info, Self::Generic, Self::Unknown];

    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Info => "INFO",
            Self::Generic => "GENERIC",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Lenient label lookup; `None` for anything outside the closed set.
    pub fn from_label(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL.into_iter().find(|intent| intent.label().eq_ignore_ascii_case(wanted))
    }

    pub fn runs_tool_loop(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn labels_round_trip_case_insensitively() {
        assert_eq!(Intent::from_label(" info "), Some(Intent::Info));
        assert_eq!(Intent::from_label("Update"), Some(Intent::Update));
        assert_eq!(Intent::from_label("DELETE"), None);
    }

    #[test]
    fn only_record_intents_run_tool_loops() {
        assert!(Intent::Create.runs_tool_loop());
        assert!(!Intent::Generic.runs_tool_loop());
        assert!(!Intent::Unknown.runs_tool_loop());
    }
}
