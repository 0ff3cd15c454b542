use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::clock;
use crate::llm::{GenerateRequest, GenerationClient, Part, Turn};
use crate::meals::dto::MealLog;
use crate::profile::dto::UserProfile;

/// Said when the model fails or stays silent.
pub const PLACEHOLDER_REPLY: &str =
    "I'm right here with you! I lost my train of thought for a second. Could you tell me that again?";

pub struct ResponderInput<'a> {
    /// Sanitized transcript; must not end on a user turn.
    pub history: &'a [Turn],
    pub message: &'a str,
    pub profile: &'a UserProfile,
    /// Logged meals available as context, typically today's.
    pub meals: &'a [MealLog],
    pub now: OffsetDateTime,
}

fn system_instruction(input: &ResponderInput<'_>) -> String {
    let coach = input.profile.active_coach();
    let eaten: i32 = input.meals.iter().map(|m| m.calories).sum();
    format!(
        "You are {name}, the user's nutrition coach.\n\
         Personality: {personality}\n\
         Background: {background}\n\
         Tone: {tone}\n\n\
         The user is {user}, who wants to {goal}. Daily target: {target} kcal. \
         So far today ({today}) they have logged {eaten} kcal across {count} meals.\n\n\
         Reply in plain conversational prose, in character, in the language the user \
         writes in. Never output JSON, tables or code. You do not record meals: if the \
         user describes food, comment on it as a coach would, but do not claim to have \
         logged it.",
        name = coach.name,
        personality = coach.personality,
        background = coach.background,
        tone = coach.tone,
        user = input.profile.name,
        goal = input.profile.goal.describe(),
        target = input.profile.target_calories,
        today = clock::format_ymd(input.now.date()),
        eaten = eaten,
        count = input.meals.len(),
    )
}

/// Free-form coaching reply. Always returns non-empty prose.
#[instrument(skip_all, fields(history_len = input.history.len()))]
pub async fn respond(client: &dyn GenerationClient, input: &ResponderInput<'_>) -> String {
    let request = GenerateRequest {
        system_instruction: system_instruction(input),
        history: input.history.to_vec(),
        parts: vec![Part::Text(input.message.to_string())],
        schema: None,
    };
    match client.generate(&request).await {
        Ok(resp) => match resp.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            Some(text) => text,
            None => {
                warn!("responder returned empty text");
                PLACEHOLDER_REPLY.to_string()
            }
        },
        Err(e) => {
            warn!(error = %e, "responder generation failed");
            PLACEHOLDER_REPLY.to_string()
        }
    }
}
