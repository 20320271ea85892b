use serde::de::{Deserialize, Deserializer};
use serde::Serialize;

/// Named board presets. An unrecognized value on the wire falls back to
/// `Hard`, matching the reference server's behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Hand-written so an unrecognized difficulty string falls back to `Hard`
/// instead of rejecting the whole message -- the strict-enum behavior the
/// derive would otherwise give `#[serde(rename_all = "lowercase")]`.
impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            _ => Difficulty::Hard,
        })
    }
}

impl Difficulty {
    pub fn dimensions(&self) -> (usize, usize, usize) {
        match self {
            Difficulty::Easy => (5, 5, 10),
            Difficulty::Medium => (10, 10, 20),
            Difficulty::Hard => (10, 20, 30),
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Hard
    }
}
