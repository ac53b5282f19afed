mod generate;
mod guard;

pub use guard::*;

/// What a presented key allows the caller to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthorityLevel {
    Unauthorized,
    /// May submit scores, as the arcade machine or its bridge does.
    Device,
    /// May also add named scores and reset the leaderboard.
    Admin,
}

/// Keys that grant capabilities on mutating endpoints.
#[derive(Clone, Debug)]
pub struct AccessKeys {
    pub device_key: StringKey,
    pub admin_key: StringKey,
}

impl AccessKeys {
    pub fn authority(&self, api_key: &ApiKey<'_>) -> AuthorityLevel {
        if api_key.0 == self.admin_key.inner() {
            AuthorityLevel::Admin
        } else if api_key.0 == self.device_key.inner() {
            AuthorityLevel::Device
        } else {
            AuthorityLevel::Unauthorized
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringKey {
    key: String,
}

impl StringKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn inner(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for StringKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}
