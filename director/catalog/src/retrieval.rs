use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    entry::CatalogEntry,
    store::Catalog,
    text::{cosine_like, tokenize},
};

/// Constants of the blended lexical score.
///
/// The defaults are empirically tuned; callers should rely on the relative
/// ordering they produce rather than on exact values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringProfile {
    /// Weight of the term-frequency cosine.
    pub cosine_weight: f32,
    /// Weight of the lexical bonus.
    pub bonus_weight: f32,
    /// Added per query token equal to the entry key.
    pub exact_key_bonus: f32,
    /// Added per (alias, query token) pair where the alias contains the token.
    pub alias_bonus: f32,
    /// Added per (tag, query token) pair that are equal.
    pub tag_bonus: f32,
    /// Upper clamp of the lexical bonus.
    pub bonus_ceiling: f32,
}

impl ScoringProfile {
    /// Defaults for world actions.
    #[must_use]
    pub const fn world_actions() -> Self {
        Self {
            cosine_weight: 0.8,
            bonus_weight: 0.2,
            exact_key_bonus: 0.6,
            alias_bonus: 0.15,
            tag_bonus: 0.1,
            bonus_ceiling: 1.5,
        }
    }

    /// Defaults for console commands. Command names are usually typed
    /// verbatim, so an exact hit is worth more.
    #[must_use]
    pub const fn console_commands() -> Self {
        Self {
            exact_key_bonus: 1.0,
            bonus_ceiling: 2.0,
            ..Self::world_actions()
        }
    }

    /// Whether every constant is finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [
            self.cosine_weight,
            self.bonus_weight,
            self.exact_key_bonus,
            self.alias_bonus,
            self.tag_bonus,
            self.bonus_ceiling,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Catalog entry paired with its relevance to one query.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate<E> {
    /// The matched entry.
    pub entry: E,
    /// Blended score, always `> 0`.
    pub score: f32,
}

impl<E: CatalogEntry> Candidate<E> {
    /// Key of the matched entry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.key()
    }
}

/// Ranks catalog entries against free text.
#[derive(Debug, Clone, Copy)]
pub struct Retriever {
    profile: ScoringProfile,
}

impl Retriever {
    /// Creates a retriever with explicit scoring constants.
    #[must_use]
    pub const fn new(profile: ScoringProfile) -> Self {
        Self { profile }
    }

    /// Creates a retriever with the default constants of `E`.
    #[must_use]
    pub fn for_entries<E: CatalogEntry>() -> Self {
        Self::new(E::default_profile())
    }

    /// Scoring constants in use.
    #[must_use]
    pub const fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// Returns at most `k` entries of the current catalog snapshot, best
    /// first, each with a positive score.
    #[must_use]
    pub fn retrieve_top_k<E: CatalogEntry>(
        &self,
        query: &str,
        k: usize,
        catalog: &Catalog<E>,
    ) -> Vec<Candidate<E>> {
        self.rank(query, k, &catalog.snapshot())
    }

    /// Ranks a slice of entries. Ties keep slice order.
    #[must_use]
    pub fn rank<E: CatalogEntry>(&self, query: &str, k: usize, entries: &[E]) -> Vec<Candidate<E>> {
        if k == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, self.score(&query_tokens, entry)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| Candidate {
                entry: entries[idx].clone(),
                score,
            })
            .collect()
    }

    /// Blended score of one entry for pre-tokenized query text.
    #[must_use]
    pub fn score<E: CatalogEntry>(&self, query_tokens: &[String], entry: &E) -> f32 {
        let cosine = cosine_like(query_tokens, &tokenize(&entry.document_line()));
        let bonus = self.lexical_bonus(query_tokens, entry);
        self.profile
            .cosine_weight
            .mul_add(cosine, self.profile.bonus_weight * bonus)
    }

    /// Exact-key, alias-substring and tag-equality bonus, clamped to the
    /// profile ceiling.
    #[must_use]
    pub fn lexical_bonus<E: CatalogEntry>(&self, query_tokens: &[String], entry: &E) -> f32 {
        let key = entry.key().to_lowercase();
        let mut bonus = 0.0_f32;
        for token in query_tokens {
            if *token == key {
                bonus += self.profile.exact_key_bonus;
            }
        }
        for alias in entry.aliases() {
            let alias = alias.to_lowercase();
            for token in query_tokens {
                if alias.contains(token.as_str()) {
                    bonus += self.profile.alias_bonus;
                }
            }
        }
        for tag in entry.tags() {
            let tag = tag.to_lowercase();
            for token in query_tokens {
                if *token == tag {
                    bonus += self.profile.tag_bonus;
                }
            }
        }
        bonus.clamp(0.0, self.profile.bonus_ceiling)
    }
}
