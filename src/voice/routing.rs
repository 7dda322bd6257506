//! Simple-vs-complex transcript classification (§4.5): a closed set of
//! contextual markers routes a transcript to the planner instead of the
//! direct-execution loop.

const MARKER_WORDS: &[&str] = &["actually", "instead", "rather", "hmm"];

const MARKER_PHRASES: &[&str] = &[
    "what did",
    "what was",
    "what were",
    "what are",
    "how did",
    "how was",
    "how were",
    "how are",
    "why did",
    "why was",
    "why were",
    "why are",
    "remember that",
    "always use",
    "i prefer",
    "i like to",
    "tell me about",
    "explain what",
];

/// `true` if the transcript is a plain command with no contextual
/// markers; `false` if it should be routed to the planner.
pub fn is_simple_command(transcript: &str) -> bool {
    !is_complex(transcript)
}

fn is_complex(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    let words: Vec<&str> = lowered.split(|c: char| !c.is_alphanumeric()).filter(|s| !s.is_empty()).collect();

    if MARKER_WORDS.iter().any(|marker| words.contains(marker)) {
        return true;
    }

    MARKER_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}
