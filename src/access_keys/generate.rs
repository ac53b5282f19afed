use super::*;

use rand::{distributions::Alphanumeric, thread_rng, Rng};

impl StringKey {
    pub fn generate(length: usize) -> Self {
        let rng = thread_rng();

        let key: String = rng
            .sample_iter(Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();

        Self { key }
    }
}

impl AccessKeys {
    pub fn generate() -> Self {
        Self {
            device_key: StringKey::generate(16),
            admin_key: StringKey::generate(24),
        }
    }
}
