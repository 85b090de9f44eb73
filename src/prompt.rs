//! Prompt composer.
//!
//! Builds the exact instruction text and ordered image-part list sent to the
//! generation gateway for each operation. Pure assembly — no I/O. The image
//! order produced here is load-bearing: the gateway must submit parts in the
//! same order the role labels describe, or the provider's positional
//! references ("IMAGE #2") point at the wrong image.

use serde::{Deserialize, Serialize};

use crate::characters::Character;
use crate::encoding::EncodedImage;

/// Aspect ratios supported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    Square,
    Landscape,
    Portrait,
    Classic,
    Tall,
}

impl AspectRatio {
    /// Wire representation understood by the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Classic => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1:1" => Some(AspectRatio::Square),
            "16:9" => Some(AspectRatio::Landscape),
            "9:16" => Some(AspectRatio::Portrait),
            "4:3" => Some(AspectRatio::Classic),
            "3:4" => Some(AspectRatio::Tall),
            _ => None,
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Square
    }
}

/// Positional purpose of one image part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    /// Character likeness anchor
    Reference,
    /// Additional element to incorporate
    Element,
    /// The image being edited
    Target,
}

/// One image part, in submission order
#[derive(Debug, Clone)]
pub struct PromptPart {
    pub role: ImageRole,
    pub image: EncodedImage,
}

/// Composed prompt material for a single gateway call.
///
/// The gateway submits `images` in order, then `instruction`, then the raw
/// `user_prompt` as the final text part so user intent stays primary context.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub instruction: String,
    pub user_prompt: String,
    pub images: Vec<PromptPart>,
}

/// Artistic style and negative-content qualifiers, appended after the user's
/// text — never prepended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleModifiers {
    pub style: Option<String>,
    pub exclusions: Vec<String>,
}

impl StyleModifiers {
    pub fn is_empty(&self) -> bool {
        self.style.is_none() && self.exclusions.is_empty()
    }

    /// Append the qualifiers to already-written user text.
    fn apply(&self, prompt: &str) -> String {
        let mut out = prompt.to_string();
        if let Some(ref style) = self.style {
            out.push_str(&format!(" In the style of: {}.", style));
        }
        if !self.exclusions.is_empty() {
            out.push_str(&format!(" Do not include: {}.", self.exclusions.join(", ")));
        }
        out
    }
}

/// The five faithfulness instruction bands, loosest first
const FAITHFULNESS_DIRECTIVES: [&str; 5] = [
    "Treat the reference as loose inspiration only; creative deviation from the \
     character's appearance is welcome.",
    "Keep a general resemblance to the reference character, but allow noticeable \
     artistic liberties.",
    "The character should be clearly recognizable from the reference; preserve the \
     key facial features and hair.",
    "Match the reference character closely; face, hair, build and distinctive \
     features must carry over with only minor variation.",
    "The character's appearance must be an exact, critical match to the reference. \
     Reproduce the face, hair, body and distinguishing marks precisely.",
];

/// Map a 0-100 faithfulness level to its instruction band.
///
/// Band boundaries are inclusive on the upper end; values above 100 clamp into
/// the top band.
pub fn faithfulness_directive(level: u8) -> &'static str {
    match level {
        0..=20 => FAITHFULNESS_DIRECTIVES[0],
        21..=40 => FAITHFULNESS_DIRECTIVES[1],
        41..=60 => FAITHFULNESS_DIRECTIVES[2],
        61..=80 => FAITHFULNESS_DIRECTIVES[3],
        _ => FAITHFULNESS_DIRECTIVES[4],
    }
}

fn role_word(role: ImageRole) -> &'static str {
    match role {
        ImageRole::Reference => "REFERENCE",
        ImageRole::Element => "ELEMENT",
        ImageRole::Target => "TARGET",
    }
}

/// Write the numbered role labels for the assembled parts.
/// Numbering is positional among the images actually present.
fn describe_parts(parts: &[PromptPart], character: Option<&Character>, faithfulness: u8) -> String {
    let mut text = String::new();
    for (idx, part) in parts.iter().enumerate() {
        let n = idx + 1;
        match part.role {
            ImageRole::Reference => {
                // A reference part is only assembled when a character is present
                if let Some(character) = character {
                    text.push_str(&format!(
                        "IMAGE #{} is the {} for the character \"{}\": {}. {} ",
                        n,
                        role_word(part.role),
                        character.name,
                        character.description,
                        faithfulness_directive(faithfulness),
                    ));
                }
            }
            ImageRole::Element => {
                text.push_str(&format!(
                    "IMAGE #{} is an {} image; incorporate its subject into the result. ",
                    n,
                    role_word(part.role),
                ));
            }
            ImageRole::Target => {
                text.push_str(&format!(
                    "IMAGE #{} is the {} image. ",
                    n,
                    role_word(part.role),
                ));
            }
        }
    }
    text
}

/// Description-only fallback: a selected character without a reference image
/// contributes its description text but no image part.
fn describe_character_without_image(character: &Character, faithfulness: u8) -> String {
    format!(
        "The scene features the character \"{}\": {}. {} ",
        character.name,
        character.description,
        faithfulness_directive(faithfulness),
    )
}

/// Assemble parts in the fixed order: character reference, element, target.
fn assemble_parts(
    character: Option<&Character>,
    additional: Option<&EncodedImage>,
    target: Option<&EncodedImage>,
) -> Vec<PromptPart> {
    let mut parts = Vec::new();
    if let Some(reference) = character.and_then(|c| c.reference_image.as_ref()) {
        parts.push(PromptPart {
            role: ImageRole::Reference,
            image: reference.clone(),
        });
    }
    if let Some(extra) = additional {
        parts.push(PromptPart {
            role: ImageRole::Element,
            image: extra.clone(),
        });
    }
    if let Some(target) = target {
        parts.push(PromptPart {
            role: ImageRole::Target,
            image: target.clone(),
        });
    }
    parts
}

/// Compose an edit-image request.
pub fn compose_edit(
    user_prompt: &str,
    target: &EncodedImage,
    character: Option<&Character>,
    faithfulness: u8,
    additional: Option<&EncodedImage>,
    modifiers: &StyleModifiers,
) -> ComposedPrompt {
    let parts = assemble_parts(character, additional, Some(target));

    let mut instruction = String::from("Edit the TARGET image according to the user's instruction. ");
    if let Some(c) = character {
        if c.reference_image.is_none() {
            instruction.push_str(&describe_character_without_image(c, faithfulness));
        }
    }
    instruction.push_str(&describe_parts(&parts, character, faithfulness));
    instruction.push_str(
        "Apply the instruction to the TARGET image only; return the edited image.",
    );

    ComposedPrompt {
        instruction,
        user_prompt: modifiers.apply(user_prompt),
        images: parts,
    }
}

/// Compose a text-to-image generation request.
pub fn compose_generate(
    user_prompt: &str,
    character: Option<&Character>,
    faithfulness: u8,
    modifiers: &StyleModifiers,
) -> ComposedPrompt {
    let parts = assemble_parts(character, None, None);

    let mut instruction = String::from("Generate a new image from the user's description. ");
    if let Some(c) = character {
        if c.reference_image.is_none() {
            instruction.push_str(&describe_character_without_image(c, faithfulness));
        }
    }
    instruction.push_str(&describe_parts(&parts, character, faithfulness));
    instruction.push_str("Return a single finished image.");

    ComposedPrompt {
        instruction,
        user_prompt: modifiers.apply(user_prompt),
        images: parts,
    }
}

/// Compose an upscale request. No user text is involved.
pub fn compose_upscale(target: &EncodedImage) -> ComposedPrompt {
    let parts = vec![PromptPart {
        role: ImageRole::Target,
        image: target.clone(),
    }];
    ComposedPrompt {
        instruction: "IMAGE #1 is the TARGET image. Upscale it to a higher resolution, \
                      enhancing detail and sharpness without altering the content, \
                      composition or colors."
            .to_string(),
        user_prompt: String::new(),
        images: parts,
    }
}

/// Compose a character-portrait request from a description and up to five
/// reference photos.
pub fn compose_portrait(description: &str, reference_images: &[EncodedImage]) -> ComposedPrompt {
    let parts: Vec<PromptPart> = reference_images
        .iter()
        .map(|image| PromptPart {
            role: ImageRole::Reference,
            image: image.clone(),
        })
        .collect();

    let mut instruction = String::from(
        "Create a single, clean character portrait on a neutral background. ",
    );
    if !parts.is_empty() {
        instruction.push_str(&format!(
            "The {} attached image(s) are REFERENCE photos of the character; \
             use them as the definitive likeness. ",
            parts.len()
        ));
    }
    instruction.push_str("The portrait should show the character from the chest up, facing forward.");

    ComposedPrompt {
        instruction,
        user_prompt: description.to_string(),
        images: parts,
    }
}

/// Compose an outfit try-on request for a character.
pub fn compose_outfit(character: &Character, outfit_prompt: &str, faithfulness: u8) -> ComposedPrompt {
    let parts = assemble_parts(Some(character), None, None);

    let mut instruction = String::new();
    if parts.is_empty() {
        instruction.push_str(&describe_character_without_image(character, faithfulness));
    } else {
        instruction.push_str(&describe_parts(&parts, Some(character), faithfulness));
    }
    instruction.push_str(
        "Render the character full-body, wearing the outfit described by the user. \
         Keep the character's identity unchanged; only the clothing changes.",
    );

    ComposedPrompt {
        instruction,
        user_prompt: outfit_prompt.to_string(),
        images: parts,
    }
}

/// Compose a video-generation request, optionally seeded with a starting frame.
pub fn compose_video(user_prompt: &str, seed_image: Option<&EncodedImage>) -> ComposedPrompt {
    let parts = assemble_parts(None, None, seed_image);

    let instruction = if parts.is_empty() {
        "Generate a short video from the user's description.".to_string()
    } else {
        "IMAGE #1 is the TARGET starting frame. Animate it into a short video \
         following the user's description."
            .to_string()
    };

    ComposedPrompt {
        instruction,
        user_prompt: user_prompt.to_string(),
        images: parts,
    }
}
