//! Congratulatory phrases appended to success messages.

use rand::Rng;
use rand::seq::SliceRandom;

const PHRASES: &[&str] = &[
    "well done",
    "great job",
    "nice work",
    "excellent work",
    "way to go",
    "keep it up",
    "nicely done",
    "awesome",
    "fantastic",
    "terrific",
    "superb",
    "outstanding",
    "brilliant",
    "impressive",
    "splendid",
    "good going",
    "you nailed it",
    "bravo",
];

/// Pick a phrase and capitalize it.
pub(crate) fn pick<R: Rng + ?Sized>(rng: &mut R) -> String {
    let phrase = PHRASES.choose(rng).copied().unwrap_or("well done");
    capitalize(phrase)
}

/// Uppercase the first character and lowercase the rest.
fn capitalize(phrase: &str) -> String {
    let mut chars = phrase.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) fn all() -> Vec<String> {
    PHRASES.iter().map(|p| capitalize(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("way to go"), "Way to go");
        assert_eq!(capitalize("BRAVO"), "Bravo");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn pick_is_deterministic_for_a_seed() {
        let first = pick(&mut StdRng::seed_from_u64(7));
        let second = pick(&mut StdRng::seed_from_u64(7));
        assert_eq!(first, second);
        assert!(all().contains(&first));
    }
}
