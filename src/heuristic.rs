//! Deterministic, LLM-free fallback scoring based on lexical features.
//!
//! Last-resort tier: never calls the network, never fails, so a ranking job
//! can always complete with a full score vector.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Topical keywords that mark a comment as likely on-subject.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "recipe",
    "ingredient",
    "cooking",
    "taste",
    "temperature",
    "time",
    "how",
    "why",
    "what",
];

#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    /// Case-insensitive substring matches; the bonus applies at most once.
    pub keywords: Vec<String>,
    /// Symmetric jitter amplitude for tie-breaking variety. 0.0 disables it,
    /// making the scorer fully deterministic.
    pub jitter: f64,
    /// RNG seed for reproducible jitter.
    pub seed: Option<u64>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            jitter: 0.1,
            seed: None,
        }
    }
}

/// Lexical-feature scorer. Additive from a 0.5 base, clamped to [0.0, 1.0]:
/// long comments and questions score up, very short or emoji-only comments
/// score down, topical keywords add a single bonus.
pub struct HeuristicScorer {
    keywords: Vec<String>,
    jitter: f64,
    rng: Mutex<StdRng>,
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            keywords: config
                .keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            jitter: config.jitter,
            rng: Mutex::new(rng),
        }
    }

    /// Scorer with jitter disabled; identical inputs give identical scores.
    pub fn deterministic() -> Self {
        Self::new(HeuristicConfig {
            jitter: 0.0,
            ..HeuristicConfig::default()
        })
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(HeuristicConfig {
            seed: Some(seed),
            ..HeuristicConfig::default()
        })
    }

    /// Score one item. The context string is accepted for contract parity
    /// with the LLM tiers but does not influence the lexical features.
    pub fn score(&self, text: &str, _context: &str) -> f64 {
        let mut score = 0.5;

        let chars = text.chars().count();
        if chars > 100 {
            score += 0.2;
        } else if chars < 20 {
            score -= 0.2;
        }

        if text.contains('?') {
            score += 0.1;
        }

        // Emoji-only proxy: tiny after trimming and carrying non-ASCII.
        if text.trim().chars().count() < 10 && text.chars().any(|c| !c.is_ascii()) {
            score -= 0.3;
        }

        let lowered = text.to_lowercase();
        if self.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            score += 0.15;
        }

        if self.jitter > 0.0 {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            score += rng.gen_range(-self.jitter..=self.jitter);
        }

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_with_keyword_beats_emoji_blob() {
        let scorer = HeuristicScorer::deterministic();
        let question = scorer.score("This recipe is great but what temperature?", "");
        let emoji = scorer.score("🔥🔥🔥", "");
        assert!(question > emoji);
        // base + question bonus + keyword bonus
        assert!((question - 0.75).abs() < 1e-9);
        // base - short - emoji
        assert!((emoji - 0.0).abs() < 1e-9);
    }

    #[test]
    fn long_comments_score_up_short_ones_down() {
        let scorer = HeuristicScorer::deterministic();
        let long = "a".repeat(150);
        assert!((scorer.score(&long, "") - 0.7).abs() < 1e-9);
        assert!((scorer.score("nice video", "") - 0.3).abs() < 1e-9);
    }

    #[test]
    fn keyword_bonus_applies_at_most_once() {
        let scorer = HeuristicScorer::deterministic();
        let one = scorer.score("I liked the taste of this dish overall", "");
        let many = scorer.score("How long and why, what temperature works", "");
        // One keyword vs three; both land on base + keyword bonus.
        assert!((one - 0.65).abs() < 1e-9);
        assert!((many - 0.65).abs() < 1e-9);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let scorer = HeuristicScorer::deterministic();
        let upper = scorer.score("WHAT a wonderful presentation style", "");
        assert!((upper - 0.65).abs() < 1e-9);
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let a = HeuristicScorer::with_seed(42);
        let b = HeuristicScorer::with_seed(42);
        for text in ["short", "does this hold at higher temperature?", "🙂"] {
            assert_eq!(a.score(text, ""), b.score(text, ""));
        }
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let scorer = HeuristicScorer::new(HeuristicConfig {
            jitter: 0.1,
            seed: Some(7),
            ..HeuristicConfig::default()
        });
        let long_question =
            "What is the exact temperature and time for this recipe? ".repeat(4);
        for _ in 0..50 {
            let s = scorer.score(&long_question, "");
            assert!((0.0..=1.0).contains(&s));
            let t = scorer.score("🙂", "");
            assert!((0.0..=1.0).contains(&t));
        }
    }
}
