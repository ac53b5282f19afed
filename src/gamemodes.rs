use rocket::serde::Serialize;

/// Display details for the modes the arcade machine ships with.
const KNOWN_GAMEMODES: &[(&str, &str, &str)] = &[
    ("time-rush", "TIME RUSH", "⌛"),
    ("reflex", "REFLEX", "🎯"),
    ("endless", "ENDLESS", "🎮"),
    ("asteroids", "ASTEROIDS", "💫"),
    ("frogger", "FROGGER", "🐸"),
];

const FALLBACK_ICON: &str = "🕹️";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct GameMode {
    pub id: String,
    pub name: String,
    pub icon: String,
}

impl GameMode {
    pub fn describe(id: &str) -> Self {
        let (name, icon) = KNOWN_GAMEMODES
            .iter()
            .find(|(known, _, _)| *known == id)
            .map(|(_, name, icon)| (name.to_string(), icon.to_string()))
            .unwrap_or_else(|| (title_case(id), FALLBACK_ICON.to_owned()));

        Self {
            id: id.to_owned(),
            name,
            icon,
        }
    }
}

/// `space-race` becomes `Space Race`.
fn title_case(id: &str) -> String {
    id.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
