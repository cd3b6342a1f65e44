// Scenario-constrained syllable selection.
//
// The server is the only authority over syllable choice; scenarios narrow
// the candidate pool by length and by dictionary count. Selection never
// leaves the scenario while it still has candidates at all: an exhausted
// used-set is cleared and selection restarts inside the same scenario.

use crate::dictionary::DictionaryIndex;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    #[serde(rename = "4 lettres")]
    FourLetters,
    #[serde(rename = "sub8")]
    SubEight,
    #[serde(rename = "sub50")]
    SubFifty,
    #[serde(rename = "train skip")]
    TrainSkip,
}

/// Last-resort syllables when the index has nothing usable.
static SEED_SYLLABLES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "RE", "LA", "TI", "ON", "EN", "AN", "ER", "IN", "CH", "OU", "ES", "AR", "TION", "MENT",
        "ABLE", "ISME",
    ]
});

pub fn allowed_lengths(scenario: Option<Scenario>) -> &'static [usize] {
    match scenario {
        Some(Scenario::FourLetters) => &[4],
        _ => &[2, 3],
    }
}

/// Count ceiling applied by the count-based scenarios. The server side uses
/// the `<=` variant; the stricter exact-count rule only exists on the
/// client's solo path.
pub fn count_cap(scenario: Option<Scenario>) -> Option<u32> {
    match scenario {
        Some(Scenario::SubEight) => Some(8),
        Some(Scenario::SubFifty) => Some(50),
        _ => None,
    }
}

/// Pick the next syllable under the scenario constraints.
///
/// `used` is cleared in place when the scenario pool is exhausted (the
/// scenario-preserving reset). The caller inserts the returned syllable into
/// `used` before broadcasting. A `None` return means the game must end —
/// only the practice set (`trainAllowed`) can run dry; every other path has
/// the seed-list fallback.
pub fn choose_syllable(
    index: &DictionaryIndex,
    scenario: Option<Scenario>,
    used: &mut HashSet<String>,
    train_allowed: Option<&HashSet<String>>,
) -> Option<String> {
    let mut rng = rand::rng();

    // Practice mode: candidates come only from the allowed set.
    if let Some(allowed) = train_allowed {
        let candidates: Vec<&String> = allowed.iter().filter(|s| !used.contains(*s)).collect();
        if candidates.is_empty() {
            return None;
        }
        let counted: Vec<(&String, u32)> = candidates
            .iter()
            .filter_map(|s| {
                let count = index.count_for(s)?;
                (count > 0).then_some((*s, count))
            })
            .collect();
        if counted.is_empty() {
            return candidates.choose(&mut rng).map(|s| (*s).to_string());
        }
        return counted
            .choose_weighted(&mut rng, |(_, count)| f64::from(*count))
            .ok()
            .map(|(s, _)| (*s).to_string());
    }

    let cap = count_cap(scenario);
    let mut lengths: Vec<usize> = allowed_lengths(scenario).to_vec();
    // Uniform length choice: randomize the probe order.
    let start = rng.random_range(0..lengths.len());
    lengths.rotate_left(start);

    // Pass 1: scenario pool minus the used set.
    if let Some(choice) = pick_from_counts(index, &lengths, cap, Some(used), &mut rng) {
        return Some(choice);
    }

    // Pass 2: the pool is exhausted; reset within the scenario.
    if !used.is_empty() {
        used.clear();
        if let Some(choice) = pick_from_counts(index, &lengths, cap, None, &mut rng) {
            return Some(choice);
        }
    }

    // Pass 3: the scenario has no candidates at all under its count cap;
    // degrade to the indexed syllables filtered by length only.
    if cap.is_some() {
        if let Some(choice) = pick_from_counts(index, &lengths, None, Some(used), &mut rng) {
            return Some(choice);
        }
        if let Some(choice) = pick_from_counts(index, &lengths, None, None, &mut rng) {
            return Some(choice);
        }
    }

    // Pass 4: built-in seed list.
    let seeds: Vec<&&str> = SEED_SYLLABLES
        .iter()
        .filter(|s| lengths.contains(&s.chars().count()) && !used.contains(**s))
        .collect();
    if let Some(seed) = seeds.choose(&mut rng) {
        return Some((**seed).to_string());
    }
    SEED_SYLLABLES
        .iter()
        .filter(|s| lengths.contains(&s.chars().count()))
        .collect::<Vec<_>>()
        .choose(&mut rng)
        .map(|s| (**s).to_string())
}

/// Weighted pick over the count maps. With a count cap active the choice is
/// uniform so rare syllables stay equidistributed; without one, weights are
/// sqrt(count) to bias toward frequent syllables without crushing the
/// mid-frequency range.
fn pick_from_counts(
    index: &DictionaryIndex,
    lengths: &[usize],
    cap: Option<u32>,
    used: Option<&HashSet<String>>,
    rng: &mut impl Rng,
) -> Option<String> {
    for len in lengths {
        let Some(stats) = index.stats_for(*len) else {
            continue;
        };
        let candidates: Vec<(&String, u32)> = stats
            .iter()
            .filter(|(syl, count)| {
                **count > 0
                    && cap.map(|c| **count <= c).unwrap_or(true)
                    && used.map(|u| !u.contains(*syl)).unwrap_or(true)
            })
            .map(|(syl, count)| (syl, *count))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        if cap.is_some() {
            return candidates.choose(rng).map(|(syl, _)| (*syl).clone());
        }
        return candidates
            .choose_weighted(rng, |(_, count)| f64::from(*count).sqrt())
            .ok()
            .map(|(syl, _)| (*syl).clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> DictionaryIndex {
        // XY and ZT appear in few words; ON is everywhere.
        let mut words = vec![
            "AXYB".to_string(),
            "CXYD".to_string(),
            "EZTA".to_string(),
            "TION".to_string(),
            "MENTION".to_string(),
        ];
        for i in 0..60 {
            words.push(format!("BONBON{i}"));
        }
        DictionaryIndex::build_from_lines(words, 30)
    }

    #[test]
    fn test_scenario_lengths() {
        assert_eq!(allowed_lengths(Some(Scenario::FourLetters)), &[4]);
        assert_eq!(allowed_lengths(None), &[2, 3]);
        assert_eq!(allowed_lengths(Some(Scenario::SubEight)), &[2, 3]);
    }

    #[test]
    fn test_scenario_serde_names() {
        assert_eq!(
            serde_json::to_value(Scenario::FourLetters).unwrap(),
            serde_json::json!("4 lettres")
        );
        let s: Scenario = serde_json::from_value(serde_json::json!("train skip")).unwrap();
        assert_eq!(s, Scenario::TrainSkip);
    }

    #[test]
    fn test_sub8_only_emits_rare_syllables() {
        let index = index();
        let mut used = HashSet::new();
        // Every pick must have count <= 8 while such candidates exist.
        for _ in 0..40 {
            let syl = choose_syllable(&index, Some(Scenario::SubEight), &mut used, None).unwrap();
            let count = index.count_for(&syl).unwrap();
            assert!(count <= 8, "{syl} has count {count}");
            used.insert(syl);
        }
    }

    #[test]
    fn test_used_set_clears_within_scenario() {
        let index = DictionaryIndex::build_from_lines(["AXYB", "CXYD", "EZTA"], 30);
        let mut used = HashSet::new();

        // Exhaust the whole pool, then keep drawing: the reset must stay
        // inside the scenario pool.
        for _ in 0..30 {
            let syl =
                choose_syllable(&index, Some(Scenario::SubEight), &mut used, None).unwrap();
            assert!(index.count_for(&syl).unwrap() <= 8);
            used.insert(syl);
        }
    }

    #[test]
    fn test_sub8_with_no_candidates_degrades() {
        // Every syllable has count > 8: the fallback must still produce one
        // instead of looping.
        let words: Vec<String> = (0..20).map(|i| format!("BONJOUR{i}")).collect();
        let index = DictionaryIndex::build_from_lines(words, 30);
        let mut used = HashSet::new();
        let syl = choose_syllable(&index, Some(Scenario::SubEight), &mut used, None);
        assert!(syl.is_some());
    }

    #[test]
    fn test_four_letters_scenario() {
        let index = index();
        let mut used = HashSet::new();
        let syl =
            choose_syllable(&index, Some(Scenario::FourLetters), &mut used, None).unwrap();
        assert_eq!(syl.chars().count(), 4);
    }

    #[test]
    fn test_train_set_restricts_and_exhausts() {
        let index = index();
        let allowed: HashSet<String> = ["XY".to_string(), "ZT".to_string()].into();
        let mut used = HashSet::new();

        let first =
            choose_syllable(&index, Some(Scenario::TrainSkip), &mut used, Some(&allowed))
                .unwrap();
        assert!(allowed.contains(&first));
        used.insert(first);

        let second =
            choose_syllable(&index, Some(Scenario::TrainSkip), &mut used, Some(&allowed))
                .unwrap();
        assert!(allowed.contains(&second));
        used.insert(second);

        // Exhausted practice set ends the game.
        assert!(
            choose_syllable(&index, Some(Scenario::TrainSkip), &mut used, Some(&allowed))
                .is_none()
        );
    }

    #[test]
    fn test_empty_index_falls_back_to_seeds() {
        let index = DictionaryIndex::build_from_lines(Vec::<String>::new(), 30);
        let mut used = HashSet::new();
        let syl = choose_syllable(&index, None, &mut used, None).unwrap();
        assert!(SEED_SYLLABLES.contains(&syl.as_str()));
    }

    #[test]
    fn test_plain_selection_prefers_frequent() {
        let index = index();
        let mut hits = 0;
        for _ in 0..50 {
            let mut used = HashSet::new();
            let syl = choose_syllable(&index, None, &mut used, None).unwrap();
            if ["ON", "BO", "NB", "BON", "ONB", "NBO"].contains(&syl.as_str()) {
                hits += 1;
            }
        }
        // sqrt(count) weighting: the frequent BONBON syllables dominate the
        // handful of rare ones by a wide margin.
        assert!(hits > 20, "only {hits}/50 frequent picks");
    }
}
