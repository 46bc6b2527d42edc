//! Query rewrites used to broaden upstream recall.
//!
//! Variants are generated in a fixed priority order, deduplicated, and
//! capped; the variant index feeds back into scoring as a penalty so
//! that hits on the original query outrank hits on a rewrite.

use super::text::{is_noise_word, normalize, tokenize};

/// Maximum number of variants sent upstream per search.
pub const MAX_VARIANTS: usize = 4;

/// Minimum token length for the shortened-by-one-char rewrite.
const SHORTEN_MIN_LEN: usize = 6;

/// Generate the ordered, deduplicated variant list (≤ [`MAX_VARIANTS`])
/// for a normalized query.
pub fn generate_variants(query: &str) -> Vec<String> {
    let normalized = normalize(query);
    if normalized.is_empty() {
        return Vec::new();
    }

    let tokens = tokenize(&normalized);
    let mut candidates: Vec<String> = vec![normalized.clone()];

    let without_noise: Vec<&String> = tokens.iter().filter(|t| !is_noise_word(t)).collect();
    if !without_noise.is_empty() && without_noise.len() < tokens.len() {
        candidates.push(join(&without_noise));
    }

    if tokens.len() >= 2 {
        candidates.push(join(&tokens[..tokens.len() - 1].iter().collect::<Vec<_>>()));
        candidates.push(join(&tokens[..2.min(tokens.len())].iter().collect::<Vec<_>>()));
        candidates.push(tokens[0].clone());

        for skip in 0..tokens.len() {
            let rest: Vec<&String> = tokens
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, t)| t)
                .collect();
            candidates.push(join(&rest));
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        let len = token.chars().count();
        if len >= SHORTEN_MIN_LEN {
            let shortened: String = token.chars().take(len - 1).collect();
            let rewritten: Vec<String> = tokens
                .iter()
                .enumerate()
                .map(|(j, t)| if j == i { shortened.clone() } else { t.clone() })
                .collect();
            candidates.push(rewritten.join(" "));
            break;
        }
    }

    let mut variants = Vec::new();
    for candidate in candidates {
        let candidate = normalize(&candidate);
        if candidate.is_empty() || variants.contains(&candidate) {
            continue;
        }
        variants.push(candidate);
        if variants.len() == MAX_VARIANTS {
            break;
        }
    }
    variants
}

fn join(tokens: &[&String]) -> String {
    tokens
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
