use rand::{seq::SliceRandom, thread_rng, Rng};

/// Longest display name a score may carry, user supplied or generated.
pub const MAX_NAME_LENGTH: usize = 20;

const ADJECTIVES: &[&str] = &[
    "Cyber", "Robo", "Giga", "Mega", "Hyper", "Atomic", "Cosmic", "Galactic", "Quantum", "Zero",
];
const NOUNS: &[&str] = &[
    "Striker", "Blaster", "Hunter", "Raptor", "Viper", "Shadow", "Knight", "Ninja", "Phantom",
    "Spectre",
];

/// Generates a fallback display name such as `CosmicViper4821`.
pub fn generate_name() -> String {
    generate_name_with(&mut thread_rng())
}

pub fn generate_name_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Zero");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Striker");
    let number: u16 = rng.gen_range(1000..10000);
    format!("{}{}{}", adjective, noun, number)
}

/// Trims `proposed` and cuts it to [`MAX_NAME_LENGTH`] characters.
/// Returns `None` when nothing is left after trimming.
pub fn sanitize_name(proposed: &str) -> Option<String> {
    let trimmed = proposed.trim();
    if trimmed.is_empty() {
        return None;
    }
    let name: String = trimmed.chars().take(MAX_NAME_LENGTH).collect();
    Some(name.trim_end().to_owned())
}
