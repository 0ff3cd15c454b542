use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::llm::{
    strip_code_fences, FieldKind, GenerateRequest, GenerationClient, Part, ResponseSchema,
};

/// A generated coach identity. Every field but `avatar` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachProfile {
    pub name: String,
    pub personality: String,
    pub background: String,
    pub tone: String,
    pub greeting: String,
    /// URI, storage key or inline `data:` image. Empty means placeholder glyph.
    #[serde(default)]
    pub avatar: String,
}

impl Default for CoachProfile {
    fn default() -> Self {
        Self {
            name: "Coach Sora".into(),
            personality: "Warm, upbeat and practical. Celebrates small wins and never shames."
                .into(),
            background: "A registered dietitian who spent ten years helping busy people eat \
                         well without giving up the food they love."
                .into(),
            tone: "Friendly and encouraging, short sentences, the occasional emoji.".into(),
            greeting: "Hi! I'm Sora. Tell me what you ate, or send a photo, and we'll keep \
                       track together."
                .into(),
            avatar: String::new(),
        }
    }
}

/// What the persona call must produce before an avatar is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PersonaDraft {
    pub profile: CoachProfile,
    pub image_prompt: String,
}

const PERSONA_FIELDS: [&str; 6] = [
    "name",
    "personality",
    "background",
    "tone",
    "greeting",
    "image_prompt",
];

fn persona_schema() -> ResponseSchema {
    PERSONA_FIELDS
        .iter()
        .fold(ResponseSchema::default(), |s, f| s.required(*f, FieldKind::String))
}

fn persona_prompt(style_hint: Option<&str>) -> String {
    let style = match style_hint.map(str::trim).filter(|s| !s.is_empty()) {
        Some(hint) => format!("The user asked for a coach who is: {hint}."),
        None => "Surprise the user with an original, likeable character.".to_string(),
    };
    format!(
        "Invent a personal nutrition coach for a calorie tracking app. {style}\n\
         Return JSON with these string fields:\n\
         - name: the coach's display name\n\
         - personality: two or three sentences\n\
         - background: a short backstory\n\
         - tone: how the coach talks (register, sentence length, emoji use)\n\
         - greeting: the first message the coach sends, in character\n\
         - image_prompt: an English prompt for a friendly square portrait avatar \
           of this coach, illustration style, plain background"
    )
}

/// Checks every required field explicitly; any absence or blank is malformed.
pub(crate) fn parse_persona(raw: &str) -> Result<PersonaDraft, String> {
    let v: Value = serde_json::from_str(strip_code_fences(raw)).map_err(|e| e.to_string())?;
    let field = |name: &str| -> Result<String, String> {
        match v.get(name).and_then(Value::as_str).map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(format!("missing field `{name}`")),
        }
    };
    Ok(PersonaDraft {
        profile: CoachProfile {
            name: field("name")?,
            personality: field("personality")?,
            background: field("background")?,
            tone: field("tone")?,
            greeting: field("greeting")?,
            avatar: String::new(),
        },
        image_prompt: field("image_prompt")?,
    })
}

/// Generates a new coach. Never fails: any problem in the persona step
/// yields [`CoachProfile::default`], and a failed avatar only leaves
/// `avatar` empty.
#[instrument(skip(client))]
pub async fn generate_coach(client: &dyn GenerationClient, style_hint: Option<&str>) -> CoachProfile {
    let request = GenerateRequest {
        system_instruction: "You design characters. Answer with JSON only.".into(),
        parts: vec![Part::Text(persona_prompt(style_hint))],
        schema: Some(persona_schema()),
        ..Default::default()
    };

    let raw = match client.generate(&request).await {
        Ok(resp) => resp.text.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "persona generation failed; using default coach");
            return CoachProfile::default();
        }
    };
    let draft = match parse_persona(&raw) {
        Ok(d) => d,
        Err(reason) => {
            warn!(%reason, "persona response malformed; using default coach");
            return CoachProfile::default();
        }
    };

    let mut coach = draft.profile;
    match client.generate_image(&draft.image_prompt).await {
        Ok(img) => coach.avatar = img.data_url(),
        Err(e) => warn!(error = %e, coach = %coach.name, "avatar generation failed"),
    }
    info!(coach = %coach.name, has_avatar = !coach.avatar.is_empty(), "coach generated");
    coach
}
