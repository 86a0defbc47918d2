//! Prompt rendering for the ranking tiers.
//!
//! Domain logic only; provider-agnostic. Each tier has its own request shape:
//! the mega and batch prompts demand an exact count of comma-separated
//! ratings, the single prompt demands one bare number.

/// Default sampling temperature for rating requests. Low: ratings should be
/// stable across retries.
pub const RATING_TEMPERATURE: f32 = 0.1;

/// Character cap per item in a mega request, to bound token usage.
pub const MEGA_ITEM_CHAR_CAP: usize = 500;

/// Character cap per item in a batch request.
pub const BATCH_ITEM_CHAR_CAP: usize = 300;

/// Output budget for a mega response (N comma-separated ratings).
pub const MEGA_MAX_OUTPUT_TOKENS: u32 = 2_000;

/// Output budget for a batch response.
pub const BATCH_MAX_OUTPUT_TOKENS: u32 = 500;

/// Output budget for a single-item response (one number).
pub const SINGLE_MAX_OUTPUT_TOKENS: u32 = 50;

const RATING_CRITERIA: &str = "\
Rating criteria:
- 1.0: Comment adds significant value, complements or clarifies the content
- 0.7-0.9: Comment is relevant and contains useful information
- 0.4-0.6: Comment is partially related to the topic
- 0.1-0.3: Comment is weakly related to the content
- 0.0: Comment is unrelated to the content (spam, off-topic, emotions without substance)";

/// One request carrying the entire item list.
pub fn mega_prompt(context: &str, items: &[String]) -> String {
    let listing = numbered_listing(items, MEGA_ITEM_CHAR_CAP);
    format!(
        "Rate the informativeness of ALL these comments relative to the content on a scale from 0.0 to 1.0.\n\n\
         Content: {context}\n\n\
         Comments ({count} total):\n{listing}\n\
         {RATING_CRITERIA}\n\n\
         IMPORTANT: Respond with EXACTLY {count} ratings separated by commas, one for each comment in order.\n\
         Example format: 0.8, 0.3, 0.9, 0.1, 0.7, 0.2, ...\n\n\
         Ratings:",
        count = items.len(),
    )
}

/// One request for a fixed-size chunk of items.
pub fn batch_prompt(context: &str, items: &[String]) -> String {
    let listing = numbered_listing(items, BATCH_ITEM_CHAR_CAP);
    format!(
        "Rate the informativeness of these comments relative to the content on a scale from 0.0 to 1.0.\n\n\
         Content: {context}\n\n\
         Comments ({count} total):\n{listing}\n\
         {RATING_CRITERIA}\n\n\
         Respond with EXACTLY {count} ratings separated by commas.\n\
         Ratings:",
        count = items.len(),
    )
}

/// One request for one item.
pub fn single_prompt(context: &str, item: &str) -> String {
    format!(
        "Rate the informativeness of this comment relative to the content on a scale from 0.0 to 1.0.\n\n\
         Content: {context}\n\n\
         Comment: {item}\n\n\
         {RATING_CRITERIA}\n\n\
         Respond with only a number from 0.0 to 1.0:"
    )
}

/// Coarse token estimate used for quota admission: whitespace word count plus
/// a small per-item allowance for the comma-separated response.
pub fn estimate_tokens(prompt: &str, n_items: usize) -> u64 {
    prompt.split_whitespace().count() as u64 + 3 * n_items as u64
}

fn numbered_listing(items: &[String], char_cap: usize) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, truncate_chars(item, char_cap)));
    }
    out
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(cap).collect();
        truncated.push_str("...");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mega_prompt_demands_exact_count() {
        let p = mega_prompt("a cooking video", &items(&["first", "second", "third"]));
        assert!(p.contains("EXACTLY 3 ratings"));
        assert!(p.contains("1. first\n2. second\n3. third"));
        assert!(p.contains("a cooking video"));
        assert!(p.ends_with("Ratings:"));
    }

    #[test]
    fn long_items_are_truncated_with_ellipsis() {
        let long = "x".repeat(MEGA_ITEM_CHAR_CAP + 50);
        let p = mega_prompt("ctx", &items(&[&long]));
        assert!(p.contains(&format!("{}...", "x".repeat(MEGA_ITEM_CHAR_CAP))));
        assert!(!p.contains(&"x".repeat(MEGA_ITEM_CHAR_CAP + 1)));
    }

    #[test]
    fn batch_cap_is_tighter_than_mega_cap() {
        let long = "y".repeat(400);
        let b = batch_prompt("ctx", &items(&[&long]));
        assert!(b.contains(&format!("{}...", "y".repeat(BATCH_ITEM_CHAR_CAP))));
        let m = mega_prompt("ctx", &items(&[&long]));
        assert!(m.contains(&"y".repeat(400)));
    }

    #[test]
    fn single_prompt_asks_for_one_number() {
        let p = single_prompt("ctx", "is this right?");
        assert!(p.contains("only a number"));
        assert!(p.contains("is this right?"));
    }

    #[test]
    fn token_estimate_counts_words_plus_item_allowance() {
        assert_eq!(estimate_tokens("three short words", 10), 3 + 30);
    }

    #[test]
    fn truncation_is_codepoint_safe() {
        let emoji = "🙂".repeat(MEGA_ITEM_CHAR_CAP + 1);
        let p = mega_prompt("ctx", &items(&[&emoji]));
        assert!(p.contains("..."));
    }
}
