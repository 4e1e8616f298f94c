//! Built-in style catalogs.
//!
//! Templates describe the environment kept elements are placed into during
//! recomposition. Inspiration styles are one-click additions to the freeform
//! instructions.

use crate::error::RecomposeError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A named bundle of style instructions for recompose mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Placement clause spliced into the composed instructions.
    pub style: String,
}

impl Template {
    fn new(id: &str, name: &str, description: &str, style: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            style: style.to_string(),
        }
    }
}

/// A stock style that can be appended to the freeform instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Inspiration {
    pub id: &'static str,
    pub description: &'static str,
}

impl Inspiration {
    /// The clause appended to the instructions.
    pub fn clause(&self) -> String {
        format!("Style: {}", self.description)
    }
}

/// Id of the template a new session starts with.
pub const DEFAULT_TEMPLATE_ID: &str = "pub_warm";

static TEMPLATES: Lazy<Vec<Template>> = Lazy::new(|| {
    vec![
        Template::new(
            "studio_clean",
            "Clean Studio",
            "Minimalist background highlighting the subject",
            "in a clean, modern studio setting with soft professional lighting, minimalist background",
        ),
        Template::new(
            "pub_warm",
            "Tavern Warmth",
            "Cozy, warm lighting with wood textures",
            "inside a cozy, upscale tavern with warm ambient lighting, rich mahogany wood textures, and a welcoming atmosphere",
        ),
        Template::new(
            "neon_city",
            "Neon City",
            "Vibrant cyberpunk aesthetic",
            "in a vibrant futuristic city street at night with neon signage, wet pavement reflections, and cinematic cyan and magenta lighting",
        ),
        Template::new(
            "nature_calm",
            "Serene Nature",
            "Outdoor landscape with natural light",
            "in a serene outdoor landscape with natural sunlight, lush greenery, and a shallow depth of field",
        ),
        Template::new(
            "tv_broadcast",
            "TV Broadcast",
            "Professional news or presentation style",
            "in a professional tv broadcast graphic overlay style, high contrast, suitable for digital signage",
        ),
    ]
});

const INSPIRATIONS: [Inspiration; 4] = [
    Inspiration {
        id: "restaurant",
        description: "Restaurant Interior",
    },
    Inspiration {
        id: "lamps",
        description: "Lamps",
    },
    Inspiration {
        id: "office",
        description: "Office",
    },
    Inspiration {
        id: "tools",
        description: "Tools",
    },
];

pub fn templates() -> &'static [Template] {
    &TEMPLATES
}

pub fn find_template(id: &str) -> Result<&'static Template, RecomposeError> {
    TEMPLATES
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| RecomposeError::UnknownTemplate { id: id.to_string() })
}

pub fn default_template() -> &'static Template {
    TEMPLATES
        .iter()
        .find(|t| t.id == DEFAULT_TEMPLATE_ID)
        .unwrap_or(&TEMPLATES[0])
}

pub fn inspirations() -> &'static [Inspiration] {
    &INSPIRATIONS
}

pub fn find_inspiration(id: &str) -> Result<&'static Inspiration, RecomposeError> {
    INSPIRATIONS
        .iter()
        .find(|i| i.id == id)
        .ok_or_else(|| RecomposeError::UnknownInspiration { id: id.to_string() })
}
