//! Prompts for element analysis and image synthesis.
//!
//! Every prompt string lives here so behaviour changes touch one file and
//! tests can inspect prompts without calling a model. Instruction construction
//! for recompose mode is a pure function of session state: the same kept
//! labels, template, and freeform text always produce the same payload.

use crate::catalog::Template;
use crate::session::InstructionSource;

/// System prompt for the element analyzer.
///
/// Used when `RecomposeConfig::analysis_prompt` is `None`.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a visual scene analyst. You identify the distinct visual elements of an image so they can be separated and recomposed.

Follow these rules precisely:

1. ELEMENTS
   - List the main person or people, specific objects, the background context, and any visible text
   - One entry per element that could be cut out and placed elsewhere
   - Order entries from most to least prominent

2. FIELDS
   - "label": short descriptive name of the element
   - "type": exactly one of "object", "text", "background", "person"
   - "description": detailed visual description for reconstruction

3. OUTPUT FORMAT
   - Output ONLY a JSON object of the form {"elements": [...]}
   - Do NOT wrap in ```json fences
   - Do NOT add commentary or explanations"#;

/// User turn sent alongside the image.
pub const ANALYSIS_USER_PROMPT: &str = "Analyze this image. Identify the distinct visual elements \
(main person, specific objects, background context, visible text) that could be separated. \
Return a JSON object with a list of elements.";

/// Appended to template-composed instructions so the model keeps the look of
/// the kept elements while ignoring the source framing.
const REFERENCE_SUFFIX: &str = "Ignore the original aspect ratio. \
Output a high-quality, photorealistic image suitable for a TV display. \
Ensure text is legible if preserved.";

/// Phrase used when no element is marked as kept.
const EVERYTHING: &str = "all elements of the reference image";

/// The instruction payload for one synthesis call and the branch that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub text: String,
    pub source: InstructionSource,
}

/// Build the recompose-mode instruction payload.
///
/// Non-empty `freeform` (after trimming) is the whole payload and the template
/// is ignored. Otherwise the kept labels, comma-joined in the order given, are
/// placed according to the template's style.
pub fn recompose_instructions(
    freeform: &str,
    kept_labels: &[&str],
    template: &Template,
) -> Instructions {
    let freeform = freeform.trim();
    if !freeform.is_empty() {
        return Instructions {
            text: freeform.to_string(),
            source: InstructionSource::Freeform,
        };
    }

    let kept = if kept_labels.is_empty() {
        EVERYTHING.to_string()
    } else {
        kept_labels.join(", ")
    };

    let text = format!(
        "Create a professional composition featuring: {kept}. Place them {style}. \
Use the provided image as a strict visual reference for the appearance of the {kept}. \
{REFERENCE_SUFFIX}",
        style = template.style.trim().trim_end_matches('.'),
    );

    Instructions {
        text,
        source: InstructionSource::Template {
            template_id: template.id.clone(),
        },
    }
}

/// Build the create-new payload. Returns `None` when there is nothing to send.
pub fn create_new_instructions(freeform: &str) -> Option<Instructions> {
    let freeform = freeform.trim();
    if freeform.is_empty() {
        return None;
    }
    Some(Instructions {
        text: freeform.to_string(),
        source: InstructionSource::Freeform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::find_template;

    #[test]
    fn template_branch_joins_labels_in_order() {
        let template = find_template("neon_city").unwrap();
        let ins = recompose_instructions("", &["Chef", "Pan", "Menu board"], template);
        assert!(ins
            .text
            .starts_with("Create a professional composition featuring: Chef, Pan, Menu board."));
        assert!(ins.text.contains(&template.style));
        assert_eq!(
            ins.source,
            InstructionSource::Template {
                template_id: "neon_city".into()
            }
        );
    }

    #[test]
    fn freeform_replaces_template_entirely() {
        let template = find_template("pub_warm").unwrap();
        let ins = recompose_instructions("  set the time to sunset  ", &["Chef"], template);
        assert_eq!(ins.text, "set the time to sunset");
        assert!(!ins.text.contains(&template.style));
        assert_eq!(ins.source, InstructionSource::Freeform);
    }

    #[test]
    fn whitespace_only_freeform_uses_template() {
        let template = find_template("studio_clean").unwrap();
        let ins = recompose_instructions(" \n\t", &["Logo"], template);
        assert!(matches!(ins.source, InstructionSource::Template { .. }));
    }

    #[test]
    fn no_kept_elements_means_everything() {
        let template = find_template("studio_clean").unwrap();
        let ins = recompose_instructions("", &[], template);
        assert!(ins.text.contains(EVERYTHING));
    }

    #[test]
    fn deterministic() {
        let template = find_template("tv_broadcast").unwrap();
        let a = recompose_instructions("", &["A", "B"], template);
        let b = recompose_instructions("", &["A", "B"], template);
        assert_eq!(a, b);
    }

    #[test]
    fn create_new_requires_text() {
        assert!(create_new_instructions("   ").is_none());
        let ins = create_new_instructions("a lighthouse at dawn").unwrap();
        assert_eq!(ins.text, "a lighthouse at dawn");
        assert_eq!(ins.source, InstructionSource::Freeform);
    }
}
