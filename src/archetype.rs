use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// The fixed set of transformations applied to a source photo.
///
/// Each variant carries its prompt text as an associated constant, so an
/// "unknown archetype" can only appear at the deserialization boundary and
/// never as a runtime lookup failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Dreamer,
    Maverick,
    Scholar,
    Wanderer,
    Icon,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::Dreamer,
        Archetype::Maverick,
        Archetype::Scholar,
        Archetype::Wanderer,
        Archetype::Icon,
    ];

    /// Stable wire name, matching the serde representation.
    pub fn name(&self) -> &'static str {
        match self {
            Archetype::Dreamer => "dreamer",
            Archetype::Maverick => "maverick",
            Archetype::Scholar => "scholar",
            Archetype::Wanderer => "wanderer",
            Archetype::Icon => "icon",
        }
    }

    /// Caption text written under the panel on the composed page.
    pub fn label(&self) -> &'static str {
        match self {
            Archetype::Dreamer => "the dreamer",
            Archetype::Maverick => "the maverick",
            Archetype::Scholar => "the scholar",
            Archetype::Wanderer => "the wanderer",
            Archetype::Icon => "the icon",
        }
    }

    /// Instruction sent to the remote generation backend together with the
    /// source photo.
    pub fn prompt(&self) -> &'static str {
        match self {
            Archetype::Dreamer => {
                "Restyle the person in this photo as a soft-focus dreamer: pastel tones, \
                 loose knitwear, morning light through sheer curtains, gentle film grain. \
                 Keep the face recognizable."
            }
            Archetype::Maverick => {
                "Restyle the person in this photo as a night-city maverick: worn leather \
                 jacket, neon reflections on wet asphalt, hard rim light, confident stance. \
                 Keep the face recognizable."
            }
            Archetype::Scholar => {
                "Restyle the person in this photo as a vintage scholar: tweed and wool, \
                 warm library lamplight, shelves of old books behind, muted sepia palette. \
                 Keep the face recognizable."
            }
            Archetype::Wanderer => {
                "Restyle the person in this photo as a golden-hour wanderer: dusty \
                 travel clothes, wide desert horizon, low warm sun, wind-blown hair. \
                 Keep the face recognizable."
            }
            Archetype::Icon => {
                "Restyle the person in this photo as a high-fashion icon: studio \
                 editorial lighting, bold monochrome backdrop, sculpted shadows, \
                 magazine-cover composition. Keep the face recognizable."
            }
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown archetype: {0}")]
pub struct UnknownArchetype(String);

impl FromStr for Archetype {
    type Err = UnknownArchetype;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Archetype::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| UnknownArchetype(s.to_string()))
    }
}
