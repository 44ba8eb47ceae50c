use std::collections::HashMap;

/// Lowercases `text`, turns every non-alphanumeric character into a space and
/// splits on whitespace runs.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_owned).collect()
}

/// Cosine similarity over raw term-frequency vectors. Zero when either side
/// has no tokens.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cosine_like(query: &[String], document: &[String]) -> f32 {
    if query.is_empty() || document.is_empty() {
        return 0.0;
    }
    let fq = frequencies(query);
    let fd = frequencies(document);

    let mut dot = 0.0_f32;
    let mut nq = 0.0_f32;
    for (term, count) in &fq {
        let count = *count as f32;
        nq += count * count;
        dot += count * fd.get(term).copied().unwrap_or(0) as f32;
    }
    let nd: f32 = fd.values().map(|c| (*c as f32) * (*c as f32)).sum();
    if nq == 0.0 || nd == 0.0 {
        return 0.0;
    }
    dot / (nq.sqrt() * nd.sqrt())
}

fn frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut freq = HashMap::with_capacity(tokens.len());
    for token in tokens {
        *freq.entry(token.as_str()).or_insert(0) += 1;
    }
    freq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_punctuation() {
        assert_eq!(
            tokenize("Move_To: NPC-Scout, (0 0 0)!"),
            vec!["move", "to", "npc", "scout", "0", "0", "0"]
        );
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn cosine_is_one_for_identical_bags() {
        let a = tokenize("stat fps stat");
        let score = cosine_like(&a, &a);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_zero_without_overlap_or_tokens() {
        let q = tokenize("walk north");
        assert_eq!(cosine_like(&q, &tokenize("toggle switch")), 0.0);
        assert_eq!(cosine_like(&q, &[]), 0.0);
        assert_eq!(cosine_like(&[], &q), 0.0);
    }

    #[test]
    fn repeated_terms_weigh_more() {
        let q = tokenize("fps");
        let dense = cosine_like(&q, &tokenize("fps fps counter"));
        let sparse = cosine_like(&q, &tokenize("fps counter overlay"));
        assert!(dense > sparse);
    }
}
