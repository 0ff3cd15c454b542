use time::OffsetDateTime;
use tracing::{info, instrument};

use super::dto::{ChatMessage, MealProposal, ProposalState};
use super::error::IntakeError;
use super::history::{sanitize_messages, tail, HISTORY_CAP, INTAKE_CONTEXT_TURNS};
use super::intake::{classify, IntakeInput};
use super::responder::{respond, ResponderInput};
use crate::clock;
use crate::images::NormalizedImage;
use crate::llm::GenerationClient;
use crate::meals::dto::MealLog;
use crate::profile::dto::UserProfile;

/// One user turn, after image normalization.
pub struct TurnInput<'a> {
    pub text: Option<&'a str>,
    pub image: Option<&'a NormalizedImage>,
    /// Stored location of `image`, copied onto any proposal.
    pub image_ref: Option<String>,
    pub profile: &'a UserProfile,
    /// Stored transcript before this turn, oldest first.
    pub history: &'a [ChatMessage],
    pub meals_today: &'a [MealLog],
    pub now: OffsetDateTime,
    pub backdate_window_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Proposed,
    Conversation,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub kind: TurnKind,
    pub reply: ChatMessage,
}

/// Reply for a failure that happened before the pipeline ran, e.g. a photo
/// that could not be decoded.
pub fn failure_reply(err: &IntakeError, profile: &UserProfile, now: OffsetDateTime) -> ChatMessage {
    ChatMessage::reply(
        err.reply_text().to_string(),
        clock::epoch_ms(now),
        &profile.active_coach(),
    )
}

/// Classifies the turn, then either attaches an unconfirmed meal proposal
/// or hands over to the free-form responder. Nothing is persisted here.
#[instrument(skip_all)]
pub async fn run_turn(client: &dyn GenerationClient, input: TurnInput<'_>) -> TurnOutcome {
    let coach = input.profile.active_coach();
    let history = sanitize_messages(input.history, HISTORY_CAP);
    let ts = clock::epoch_ms(input.now);

    let intake = IntakeInput {
        text: input.text,
        image: input.image,
        profile: input.profile,
        recent: tail(&history, INTAKE_CONTEXT_TURNS),
        now: input.now,
        backdate_window_days: input.backdate_window_days,
    };
    let decision = match classify(client, &intake).await {
        Ok(d) => d,
        Err(e) => {
            info!(error = %e, "turn failed");
            return TurnOutcome {
                kind: TurnKind::Failed,
                reply: failure_reply(&e, input.profile, input.now),
            };
        }
    };

    if let Some(meal) = decision.proposal(input.now, input.image_ref.clone()) {
        let mut reply = ChatMessage::reply(decision.feedback, ts, &coach);
        reply.proposal = Some(MealProposal {
            meal,
            state: ProposalState::Proposed,
        });
        return TurnOutcome {
            kind: TurnKind::Proposed,
            reply,
        };
    }

    let message = input
        .text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("(sent a photo)");
    let text = respond(
        client,
        &ResponderInput {
            history: &history,
            message,
            profile: input.profile,
            meals: input.meals_today,
            now: input.now,
        },
    )
    .await;
    TurnOutcome {
        kind: TurnKind::Conversation,
        reply: ChatMessage::reply(text, ts, &coach),
    }
}
