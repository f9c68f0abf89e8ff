use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    System,
    Agent,
    Caller,
    Other,
}

impl Speaker {
    fn classify(line: &str) -> Self {
        if line.starts_with("System:") {
            Self::System
        } else if line.starts_with("Agent:") {
            Self::Agent
        } else if line.starts_with("User:") || line.starts_with("Caller:") {
            Self::Caller
        } else {
            Self::Other
        }
    }
}

/// One line of the call transcript. `text` is the line as the backend wrote
/// it, speaker prefix included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

#[must_use]
pub fn parse_transcript(transcript: &str) -> Vec<TranscriptLine> {
    transcript
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| TranscriptLine {
            speaker: Speaker::classify(line),
            text: line.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_speakers() {
        let lines = parse_transcript(
            "System: call connected\nAgent: What is your emergency?\nUser: My friend fell\nCaller: He is breathing\n[silence]",
        );
        let speakers: Vec<_> = lines.iter().map(|l| l.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::System,
                Speaker::Agent,
                Speaker::Caller,
                Speaker::Caller,
                Speaker::Other
            ]
        );
        assert_eq!(lines[1].text, "Agent: What is your emergency?");
    }

    #[test]
    fn test_drops_blank_lines() {
        let lines = parse_transcript("Agent: hello\n\n   \r\nUser: hi\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "User: hi");
    }

    #[test]
    fn test_prefix_must_lead_the_line() {
        let lines = parse_transcript("  Agent: indented");
        assert_eq!(lines[0].speaker, Speaker::Other);
    }

    #[test]
    fn test_placeholder_is_a_single_line() {
        let lines = parse_transcript(crate::NO_TRANSCRIPT_PLACEHOLDER);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, Speaker::Other);
    }
}
