use anyhow::Context;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{ChatMessage, MessageView, ProposalState, SubmitRequest, SubmitResponse};
use super::error::{ChatError, IntakeError};
use super::history::HISTORY_CAP;
use super::pipeline::{failure_reply, run_turn, TurnInput};
use super::repo;
use crate::clock;
use crate::images::services::{resolve_image_ref, store_meal_photo};
use crate::images::{normalize_base64, NormalizedImage};
use crate::meals::dto::{MealEdit, MealLog};
use crate::meals::{self, repo as meal_repo};
use crate::profile;
use crate::state::AppState;

fn input_parts(req: &SubmitRequest) -> Result<(Option<&str>, Option<&str>), ChatError> {
    let text = req.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let image = req
        .image_base64
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty());
    if text.is_none() && image.is_none() {
        return Err(ChatError::EmptyInput);
    }
    Ok((text, image))
}

pub async fn view(st: &AppState, m: ChatMessage) -> MessageView {
    let url = resolve_image_ref(st, m.image_ref.as_deref()).await;
    MessageView::new(m, url)
}

async fn normalize_off_thread(
    payload: &str,
) -> anyhow::Result<Result<NormalizedImage, IntakeError>> {
    let payload = payload.to_string();
    let res = tokio::task::spawn_blocking(move || normalize_base64(&payload))
        .await
        .context("image normalization task")?;
    Ok(res.map_err(IntakeError::from))
}

/// Handles one user turn end to end. The user turn and its reply are
/// stored together; a photo that cannot be decoded yields a reply that is
/// not stored at all.
#[instrument(skip(st, req), fields(has_image = req.image_base64.is_some()))]
pub async fn submit_turn(
    st: &AppState,
    user_id: Uuid,
    req: SubmitRequest,
) -> Result<SubmitResponse, ChatError> {
    let (text, image_payload) = input_parts(&req)?;
    let profile = profile::repo::get(&st.db, user_id)
        .await?
        .ok_or(ChatError::NoProfile)?;
    let request_key = req
        .client_request_id
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if let Some(key) = request_key {
        if repo::request_id_exists(&st.db, user_id, key).await? {
            return Err(ChatError::Duplicate);
        }
    }

    let now = st.now();
    let image = match image_payload {
        None => None,
        Some(payload) => match normalize_off_thread(payload).await? {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(error = %e, %user_id, "photo rejected");
                let reply = failure_reply(&e, &profile, now);
                return Ok(SubmitResponse {
                    user_message: None,
                    reply: view(st, reply).await,
                });
            }
        },
    };

    let image_ref = match &image {
        None => None,
        Some(img) => match store_meal_photo(st, user_id, img).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, %user_id, "photo upload failed; continuing without it");
                None
            }
        },
    };

    let history = repo::recent(&st.db, user_id, HISTORY_CAP as i64).await?;
    let meals_today = meals::services::meals_on(st, user_id, now.date()).await?;

    let user_message = ChatMessage::user(
        text.unwrap_or_default().to_string(),
        clock::epoch_ms(now),
        image_ref.clone(),
    );
    let outcome = run_turn(
        st.llm.as_ref(),
        TurnInput {
            text,
            image: image.as_ref(),
            image_ref,
            profile: &profile,
            history: &history,
            meals_today: &meals_today,
            now,
            backdate_window_days: st.config.backdate_window_days,
        },
    )
    .await;

    if !repo::insert_pair(&st.db, user_id, &user_message, &outcome.reply, request_key).await? {
        return Err(ChatError::Duplicate);
    }
    info!(%user_id, message_id = %outcome.reply.id, kind = ?outcome.kind, "turn stored");

    Ok(SubmitResponse {
        user_message: Some(view(st, user_message).await),
        reply: view(st, outcome.reply).await,
    })
}

pub async fn history(
    st: &AppState,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<MessageView>> {
    let messages = repo::recent(&st.db, user_id, limit.clamp(1, 500)).await?;
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        out.push(view(st, m).await);
    }
    Ok(out)
}

fn annotate_confirmed(text: &str, meal: &MealLog) -> String {
    let note = match meal.confirmation_message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => format!("Logged {} ({} kcal).", meal.name, meal.calories),
    };
    if text.trim().is_empty() {
        format!("✓ {note}")
    } else {
        format!("{text}\n\n✓ {note}")
    }
}

/// Applies edits and moves a proposed message to `Confirmed`. Returns the
/// meal to persist.
fn confirm_message(m: &mut ChatMessage, edit: &MealEdit) -> Result<MealLog, ChatError> {
    let proposal = match m.proposal.as_mut() {
        Some(p) if p.state == ProposalState::Proposed => p,
        _ => return Err(ChatError::NotProposed),
    };
    edit.apply(&mut proposal.meal);
    proposal.state = ProposalState::Confirmed;
    let meal = proposal.meal.clone();
    m.text = annotate_confirmed(&m.text, &meal);
    Ok(meal)
}

fn discard_message(m: &mut ChatMessage) -> Result<(), ChatError> {
    match m.proposal.as_mut() {
        Some(p) if p.state == ProposalState::Proposed => {
            p.state = ProposalState::Discarded;
            Ok(())
        }
        _ => Err(ChatError::NotProposed),
    }
}

#[instrument(skip(st, edit))]
pub async fn confirm(
    st: &AppState,
    user_id: Uuid,
    message_id: Uuid,
    edit: MealEdit,
) -> Result<(MessageView, MealLog), ChatError> {
    let mut tx = st.db.begin().await.context("begin tx")?;
    let mut message = repo::get_for_update_tx(&mut tx, user_id, message_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    let meal = confirm_message(&mut message, &edit)?;
    meal_repo::insert_tx(&mut tx, user_id, &meal).await?;
    repo::update_proposal_tx(&mut tx, &message).await?;
    tx.commit().await.context("commit tx")?;

    info!(%user_id, %message_id, meal_id = %meal.id, calories = meal.calories, "meal confirmed");
    Ok((view(st, message).await, meal))
}

#[instrument(skip(st))]
pub async fn discard(
    st: &AppState,
    user_id: Uuid,
    message_id: Uuid,
) -> Result<MessageView, ChatError> {
    let mut tx = st.db.begin().await.context("begin tx")?;
    let mut message = repo::get_for_update_tx(&mut tx, user_id, message_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    discard_message(&mut message)?;
    repo::update_proposal_tx(&mut tx, &message).await?;
    tx.commit().await.context("commit tx")?;

    info!(%user_id, %message_id, "proposal discarded");
    Ok(view(st, message).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::dto::MealProposal;
    use crate::coach::CoachProfile;

    fn proposed(confirmation: Option<&str>) -> ChatMessage {
        let mut m = ChatMessage::reply("Nice banana!".into(), 10, &CoachProfile::default());
        m.proposal = Some(MealProposal {
            meal: MealLog {
                id: Uuid::new_v4(),
                timestamp: 10,
                name: "Banana".into(),
                calories: 93,
                protein: 1.1,
                fat: 0.2,
                carbs: 22.5,
                image_ref: None,
                confirmation_message: confirmation.map(str::to_string),
            },
            state: ProposalState::Proposed,
        });
        m
    }

    #[test]
    fn empty_submission_is_rejected() {
        let req = SubmitRequest {
            text: Some("   ".into()),
            image_base64: Some("".into()),
            client_request_id: None,
        };
        assert!(matches!(input_parts(&req), Err(ChatError::EmptyInput)));

        let req = SubmitRequest {
            text: Some(" banana ".into()),
            ..Default::default()
        };
        assert_eq!(input_parts(&req).unwrap(), (Some("banana"), None));
    }

    #[test]
    fn confirm_applies_edits_and_annotates() {
        let mut m = proposed(None);
        let meal = confirm_message(
            &mut m,
            &MealEdit {
                calories: Some(120.4),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(meal.calories, 120);
        assert!(!m.is_log_confirmation());
        assert_eq!(m.proposal.as_ref().unwrap().state, ProposalState::Confirmed);
        assert_eq!(m.proposal.as_ref().unwrap().meal, meal);
        assert!(m.text.starts_with("Nice banana!"));
        assert!(m.text.ends_with("Logged Banana (120 kcal)."));
    }

    #[test]
    fn confirm_prefers_model_confirmation_message() {
        let mut m = proposed(Some("バナナを記録しました！"));
        confirm_message(&mut m, &MealEdit::default()).unwrap();
        assert!(m.text.ends_with("✓ バナナを記録しました！"));
    }

    #[test]
    fn only_proposed_messages_change_state() {
        let mut m = proposed(None);
        confirm_message(&mut m, &MealEdit::default()).unwrap();
        assert!(matches!(
            confirm_message(&mut m, &MealEdit::default()),
            Err(ChatError::NotProposed)
        ));
        assert!(matches!(discard_message(&mut m), Err(ChatError::NotProposed)));

        let mut plain = ChatMessage::reply("hi".into(), 1, &CoachProfile::default());
        assert!(matches!(discard_message(&mut plain), Err(ChatError::NotProposed)));

        let mut d = proposed(None);
        discard_message(&mut d).unwrap();
        assert_eq!(d.proposal.unwrap().state, ProposalState::Discarded);
        assert_eq!(d.text, "Nice banana!");
    }

    #[tokio::test]
    async fn failed_photo_reply_is_in_voice() {
        let res = normalize_off_thread("not-an-image").await.unwrap();
        let err = res.unwrap_err();
        let reply = failure_reply(&err, &crate::profile::dto::sample_profile(), clock::now_in(time::UtcOffset::UTC));
        assert_eq!(reply.text, crate::chat::error::DECODE_FAILED_REPLY);
    }
}
