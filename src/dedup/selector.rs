//! Representative selection for one equivalence class.
//!
//! The question and the answer are judged independently: the question comes
//! from the member with the highest intent score, the answer side from the
//! member with the highest composite answer score. Ties keep the earliest
//! member.

use crate::models::{CandidateTriplet, CanonicalTriplet};

/// Picks the canonical triplet of one equivalence class.
///
/// Only members with a non-empty question and answer are eligible. Returns
/// `None` when no member is eligible (including an empty class).
pub fn select_representative(class: &[&CandidateTriplet]) -> Option<CanonicalTriplet> {
    let eligible: Vec<&CandidateTriplet> = class
        .iter()
        .copied()
        .filter(|c| !c.question.is_empty() && !c.answer.is_empty())
        .collect();

    let question_source = first_argmax(&eligible, |c| c.intent)?;
    let answer_source = first_argmax(&eligible, CandidateTriplet::answer_score)?;

    Some(CanonicalTriplet::merge(question_source, answer_source))
}

/// Returns the first item with the strictly greatest key.
fn first_argmax<'a, F>(items: &[&'a CandidateTriplet], key: F) -> Option<&'a CandidateTriplet>
where
    F: Fn(&CandidateTriplet) -> f64,
{
    let mut best: Option<(&'a CandidateTriplet, f64)> = None;
    for &item in items {
        let score = key(item);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((item, score)),
        }
    }
    best.map(|(item, _)| item)
}
