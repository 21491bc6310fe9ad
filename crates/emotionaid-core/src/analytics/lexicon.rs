//! Word-list emotion classifier.

use std::collections::HashMap;

use super::records::EmotionAnalysis;

/// Label returned when no lexicon word matches
pub const UNDETERMINED: &str = "undetermined";

const SOURCE: &str = "lexicon";

const LEXICON: &[(&str, &str)] = &[
    ("happy", "joy"),
    ("glad", "joy"),
    ("joy", "joy"),
    ("great", "joy"),
    ("радость", "joy"),
    ("счастлив", "joy"),
    ("счастлива", "joy"),
    ("sad", "sadness"),
    ("unhappy", "sadness"),
    ("lonely", "sadness"),
    ("грусть", "sadness"),
    ("грустно", "sadness"),
    ("печаль", "sadness"),
    ("angry", "anger"),
    ("furious", "anger"),
    ("mad", "anger"),
    ("злюсь", "anger"),
    ("злой", "anger"),
    ("afraid", "fear"),
    ("scared", "fear"),
    ("anxious", "fear"),
    ("боюсь", "fear"),
    ("страшно", "fear"),
    ("apathy", "apathy"),
    ("bored", "apathy"),
    ("апатия", "apathy"),
];

const SARCASM_PATTERNS: &[&str] = &[
    "yeah right",
    "oh great",
    "thanks a lot",
    "so much fun",
    "ага",
    "конечно",
    "ну да",
    "очень весело",
    "спасибо, смешно",
];

/// Classifies text by counting emotion words.
///
/// The dominant emotion is the one with the most matching words (earliest
/// first seen on a tie); confidence is its match count over the word count.
#[derive(Debug, Clone)]
pub struct LexiconAnalyzer {
    lexicon: HashMap<&'static str, &'static str>,
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self {
            lexicon: LEXICON.iter().copied().collect(),
        }
    }
}

impl LexiconAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, text: &str) -> EmotionAnalysis {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| c.is_whitespace() || ".,!?:;".contains(c))
            .filter(|w| !w.is_empty())
            .collect();

        let is_sarcasm = SARCASM_PATTERNS.iter().any(|p| lower.contains(p));

        // (emotion, count) in order of first appearance
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for word in &words {
            if let Some(emotion) = self.lexicon.get(*word) {
                match counts.iter().position(|(e, _)| e == emotion) {
                    Some(i) => counts[i].1 += 1,
                    None => counts.push((*emotion, 1)),
                }
            }
        }

        let best = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, &(e, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((e, n)),
            });

        match best {
            Some((emotion, n)) => EmotionAnalysis {
                emotion: emotion.to_string(),
                confidence: n as f64 / words.len() as f64,
                is_sarcasm,
                source: SOURCE.to_string(),
            },
            None => EmotionAnalysis {
                emotion: UNDETERMINED.to_string(),
                confidence: 0.0,
                is_sarcasm,
                source: SOURCE.to_string(),
            },
        }
    }
}
