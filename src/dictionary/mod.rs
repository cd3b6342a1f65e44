// Dictionary index: syllable statistics, word samples, membership.
//
// One-shot build over the dictionary file. For each syllable length L in
// {2,3,4} the index maps syllable -> number of distinct words containing it,
// plus a bounded sample of such words. Membership is a 32-bit hash set of the
// full normalized word; collisions are accepted (validation is advisory at
// gameplay scale).

use crate::errors::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::io::AsyncBufReadExt;

pub const SYLLABLE_LENGTHS: [usize; 3] = [2, 3, 4];

/// FNV-1a, 32 bits, over the normalized word.
pub fn word_hash(word: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in word.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

/// Trim and uppercase. All lookups and inserts go through this.
pub fn normalize(word: &str) -> String {
    word.trim().to_uppercase()
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub lines_processed: usize,
}

#[derive(Debug)]
pub struct DictionaryIndex {
    membership: HashSet<u32>,
    /// Slot i holds syllables of length SYLLABLE_LENGTHS[i].
    counts: [HashMap<String, u32>; 3],
    samples: [HashMap<String, Vec<String>>; 3],
    lines_processed: usize,
}

fn slot_for(len: usize) -> Option<usize> {
    SYLLABLE_LENGTHS.iter().position(|l| *l == len)
}

impl DictionaryIndex {
    /// Index an iterator of raw dictionary lines. Empty lines are skipped.
    pub fn build_from_lines<I>(lines: I, sample_cap: usize) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut index = Self {
            membership: HashSet::new(),
            counts: Default::default(),
            samples: Default::default(),
            lines_processed: 0,
        };

        for line in lines {
            let word = normalize(line.as_ref());
            if word.is_empty() {
                continue;
            }
            index.lines_processed += 1;
            index.membership.insert(word_hash(&word));

            // Per-word syllable sets: a word contributes at most once to a
            // syllable's count even when the syllable occurs several times.
            let mut per_word: [HashSet<String>; 3] = Default::default();
            for part in word.split('-') {
                let chars: Vec<char> = part.chars().collect();
                for (slot, len) in SYLLABLE_LENGTHS.iter().enumerate() {
                    if chars.len() < *len {
                        continue;
                    }
                    for window in chars.windows(*len) {
                        if window.iter().all(|c| c.is_alphabetic()) {
                            per_word[slot].insert(window.iter().collect());
                        }
                    }
                }
            }

            for slot in 0..SYLLABLE_LENGTHS.len() {
                for syllable in per_word[slot].drain() {
                    *index.counts[slot].entry(syllable.clone()).or_insert(0) += 1;
                    let sample = index.samples[slot].entry(syllable).or_default();
                    if sample.len() < sample_cap {
                        sample.push(word.clone());
                    }
                }
            }
        }

        index
    }

    /// Stream the dictionary file line by line and build the index.
    pub async fn build_from(path: &str, sample_cap: usize) -> Result<Self, AppError> {
        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("dictionary file {path}")));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let reader = tokio::io::BufReader::new(file);
        let mut lines = reader.lines();
        let mut raw = Vec::new();
        while let Some(line) = lines.next_line().await? {
            raw.push(line);
        }

        Ok(Self::build_from_lines(raw, sample_cap))
    }

    pub fn report(&self) -> BuildReport {
        BuildReport {
            lines_processed: self.lines_processed,
        }
    }

    /// Membership by 32-bit hash.
    pub fn contains(&self, word: &str) -> bool {
        self.membership.contains(&word_hash(&normalize(word)))
    }

    /// Distinct-word count for a syllable, dispatched by its length.
    /// `None` when the length is not indexed.
    pub fn count_for(&self, syllable: &str) -> Option<u32> {
        let syllable = normalize(syllable);
        let slot = slot_for(syllable.chars().count())?;
        Some(self.counts[slot].get(&syllable).copied().unwrap_or(0))
    }

    pub fn samples_for(&self, len: usize, syllable: &str, limit: usize) -> Vec<String> {
        let syllable = normalize(syllable);
        let Some(slot) = slot_for(len) else {
            return Vec::new();
        };
        self.samples[slot]
            .get(&syllable)
            .map(|words| words.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Full count map for one syllable length (HTTP stats endpoint).
    pub fn stats_for(&self, len: usize) -> Option<&HashMap<String, u32>> {
        slot_for(len).map(|slot| &self.counts[slot])
    }

    pub fn top_syllables(&self, len: usize, limit: usize) -> Vec<(String, u32)> {
        let Some(slot) = slot_for(len) else {
            return Vec::new();
        };
        let mut entries: Vec<(String, u32)> = self.counts[slot]
            .iter()
            .map(|(s, c)| (s.clone(), *c))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }

    /// Bounded-cost scan over the sample lists. The membership set is
    /// hash-only and not enumerable, so this is the only substring search the
    /// index offers; results are deduplicated.
    pub fn scan_containing(&self, substr: &str, limit: usize) -> Vec<String> {
        let needle = normalize(substr);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        'outer: for slot in 0..SYLLABLE_LENGTHS.len() {
            for words in self.samples[slot].values() {
                for word in words {
                    if word.contains(&needle) && seen.insert(word.clone()) {
                        found.push(word.clone());
                        if found.len() >= limit {
                            break 'outer;
                        }
                    }
                }
            }
        }
        found
    }
}

/// Shared holder for the active index. Reads clone an `Arc`; a rebuild swaps
/// the pointer so concurrent readers observe either the old or the new index
/// atomically. A failed rebuild leaves the prior index in place.
pub struct DictionaryHolder {
    current: RwLock<Option<Arc<DictionaryIndex>>>,
}

impl DictionaryHolder {
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn ready(&self) -> bool {
        self.current.read().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn get(&self) -> Option<Arc<DictionaryIndex>> {
        self.current.read().ok().and_then(|g| g.clone())
    }

    pub fn install(&self, index: DictionaryIndex) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(Arc::new(index));
        }
    }

    pub async fn rebuild_from(
        &self,
        path: &str,
        sample_cap: usize,
    ) -> Result<BuildReport, AppError> {
        let index = DictionaryIndex::build_from(path, sample_cap).await?;
        let report = index.report();
        tracing::info!(
            "dictionary index built: {} words",
            report.lines_processed
        );
        self.install(index);
        Ok(report)
    }
}

// ---- dictionary file mutations (admin add/remove word) ---------------------

/// Append a word to the dictionary file, inserting a trailing newline on the
/// existing content first when missing.
pub async fn append_word(path: &str, word: &str) -> Result<(), AppError> {
    let word = normalize(word);
    if word.is_empty() {
        return Err(AppError::InvalidWord("empty word".into()));
    }
    let mut content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(AppError::Io(e)),
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&word);
    content.push('\n');
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Remove every line matching the word (case-insensitive) from the file.
/// Returns whether anything was removed.
pub async fn remove_word(path: &str, word: &str) -> Result<bool, AppError> {
    let word = normalize(word);
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("dictionary file {path}")));
        }
        Err(e) => return Err(AppError::Io(e)),
    };
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| normalize(line) != word)
        .collect();
    let removed = kept.len() != content.lines().count();
    if removed {
        let mut next = kept.join("\n");
        if !next.is_empty() {
            next.push('\n');
        }
        tokio::fs::write(path, next).await?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> DictionaryIndex {
        DictionaryIndex::build_from_lines(
            ["bonjour", "BONBON", "ronron", "  porte-monnaie  ", "", "on"],
            30,
        )
    }

    #[test]
    fn test_membership_roundtrip() {
        let index = sample_index();
        assert!(index.contains("BONJOUR"));
        assert!(index.contains("bonjour"));
        assert!(index.contains("  bonjour "));
        assert!(index.contains("PORTE-MONNAIE"));
        assert!(!index.contains("ABSENT"));
    }

    #[test]
    fn test_count_is_per_word_distinct() {
        let index = sample_index();
        // "ON" occurs in bonjour, bonbon (twice in the word, counted once),
        // ronron (twice, counted once), porte-monnaie, and the word "on".
        assert_eq!(index.count_for("ON"), Some(5));
        // "BON" in bonjour and bonbon only.
        assert_eq!(index.count_for("BON"), Some(2));
        assert_eq!(index.count_for("bon"), Some(2));
        assert_eq!(index.count_for("ZZZZ"), Some(0));
        // Length 5 is not indexed.
        assert_eq!(index.count_for("ABCDE"), None);
    }

    #[test]
    fn test_hyphen_parts_scanned_independently() {
        let index = DictionaryIndex::build_from_lines(["porte-monnaie"], 30);
        // "E-M" straddles the hyphen and must not be indexed.
        assert_eq!(index.count_for("E-M"), None);
        assert_eq!(index.count_for("EM"), Some(0));
        assert_eq!(index.count_for("TE"), Some(1));
        assert_eq!(index.count_for("MON"), Some(1));
    }

    #[test]
    fn test_non_letter_substrings_excluded() {
        let index = DictionaryIndex::build_from_lines(["AUJOURD'HUI"], 30);
        assert_eq!(index.count_for("D'"), Some(0));
        assert_eq!(index.count_for("RD"), Some(1));
        assert_eq!(index.count_for("HU"), Some(1));
    }

    #[test]
    fn test_sample_cap_bounds_lists() {
        let words: Vec<String> = (0..50).map(|i| format!("BATEAU{i}")).collect();
        let index = DictionaryIndex::build_from_lines(&words, 30);
        assert_eq!(index.count_for("EAU"), Some(50));
        assert_eq!(index.samples_for(3, "EAU", 100).len(), 30);
        assert_eq!(index.samples_for(3, "EAU", 5).len(), 5);
    }

    #[test]
    fn test_scan_containing_dedups() {
        let index = sample_index();
        let found = index.scan_containing("onjou", 10);
        assert_eq!(found, vec!["BONJOUR".to_string()]);
        // A word appears in many sample lists but must be reported once.
        let all = index.scan_containing("BON", 100);
        assert_eq!(
            all.iter().filter(|w| w.as_str() == "BONBON").count(),
            1
        );
    }

    #[test]
    fn test_accented_words_normalize() {
        let index = DictionaryIndex::build_from_lines(["éléphant"], 30);
        assert!(index.contains("ÉLÉPHANT"));
        assert_eq!(index.count_for("ÉL"), Some(1));
    }

    #[tokio::test]
    async fn test_build_from_missing_file() {
        let err = DictionaryIndex::build_from("/nonexistent/dict.txt", 30)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_holder_swap_keeps_prior_on_failure() {
        let holder = DictionaryHolder::empty();
        assert!(!holder.ready());

        holder.install(DictionaryIndex::build_from_lines(["bonjour"], 30));
        assert!(holder.ready());

        let err = holder.rebuild_from("/nonexistent/dict.txt", 30).await;
        assert!(err.is_err());
        assert!(holder.ready());
        assert!(holder.get().unwrap().contains("bonjour"));
    }

    #[tokio::test]
    async fn test_append_then_remove_restores_membership() {
        let path = std::env::temp_dir().join(format!("dict-{}.txt", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        tokio::fs::write(&path, "BONJOUR").await.unwrap();

        append_word(&path, "fenêtre").await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        // Trailing newline inserted before the appended word.
        assert_eq!(content, "BONJOUR\nFENÊTRE\n");

        let index = DictionaryIndex::build_from(&path, 30).await.unwrap();
        assert!(index.contains("fenêtre"));

        assert!(remove_word(&path, "FENÊTRE").await.unwrap());
        let index = DictionaryIndex::build_from(&path, 30).await.unwrap();
        assert!(!index.contains("fenêtre"));
        assert!(index.contains("bonjour"));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
