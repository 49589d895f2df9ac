//! Classification of short social inputs.
//!
//! Pure function over the trimmed, lowercased utterance. Anything that is
//! not an exact social phrase and not too short to mean anything is
//! [`UtteranceKind::Normal`] and goes through retrieval.

use std::fmt;

const GREETINGS: &[&str] = &["hi", "hey", "hello", "chào", "chao", "xin chào", "alo", "a lo", "hê lô"];
const FAREWELLS: &[&str] = &["bye", "goodbye", "tạm biệt", "tam biet", "hẹn gặp lại", "see you", "bai bai"];
const THANKS: &[&str] = &["thanks", "thank you", "thank", "cảm ơn", "cam on", "cám ơn", "cảm ơn em"];
const ACKNOWLEDGMENTS: &[&str] = &["ok", "oke", "okay", "uh", "um", "uhm", "à", "ờ", "ừ"];

/// Short inputs that still carry meaning (interjections used to call out).
const SHORT_BUT_CLEAR: &[&str] = &["hi", "ơi", "à", "ê"];

/// Inputs of at most this many chars are unclear unless listed above.
const SHORT_INPUT_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceKind {
    Greeting,
    Farewell,
    Thanks,
    Acknowledgment,
    ShortUnclear,
    Normal,
}

impl UtteranceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtteranceKind::Greeting => "greeting",
            UtteranceKind::Farewell => "farewell",
            UtteranceKind::Thanks => "thanks",
            UtteranceKind::Acknowledgment => "acknowledgment",
            UtteranceKind::ShortUnclear => "short_unclear",
            UtteranceKind::Normal => "normal",
        }
    }

    /// Greeting, farewell or thanks.
    pub fn is_social(&self) -> bool {
        matches!(
            self,
            UtteranceKind::Greeting | UtteranceKind::Farewell | UtteranceKind::Thanks
        )
    }
}

impl fmt::Display for UtteranceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(utterance: &str) -> UtteranceKind {
    let clean = utterance.trim().to_lowercase();
    let clean = clean.as_str();

    if GREETINGS.contains(&clean) {
        UtteranceKind::Greeting
    } else if FAREWELLS.contains(&clean) {
        UtteranceKind::Farewell
    } else if THANKS.contains(&clean) {
        UtteranceKind::Thanks
    } else if ACKNOWLEDGMENTS.contains(&clean) {
        UtteranceKind::Acknowledgment
    } else if clean.chars().count() <= SHORT_INPUT_CHARS && !SHORT_BUT_CLEAR.contains(&clean) {
        UtteranceKind::ShortUnclear
    } else {
        UtteranceKind::Normal
    }
}
