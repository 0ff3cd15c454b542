use anyhow::Context;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use super::dto::{ChatMessage, CoachAttribution, MealProposal, ProposalState};
use crate::llm::Role;
use crate::meals::dto::MealLog;

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    role: String,
    text: String,
    sent_at_ms: i64,
    proposal: Option<Json<MealLog>>,
    proposal_state: Option<String>,
    coach_name: Option<String>,
    coach_avatar: Option<String>,
    image_ref: Option<String>,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(r: MessageRow) -> anyhow::Result<Self> {
        let role = Role::parse(&r.role)
            .with_context(|| format!("message {} has unknown role `{}`", r.id, r.role))?;
        let proposal = match (r.proposal, r.proposal_state.as_deref()) {
            (Some(Json(meal)), Some(state)) => Some(MealProposal {
                meal,
                state: ProposalState::parse(state)
                    .with_context(|| format!("unknown proposal state `{state}`"))?,
            }),
            (None, None) => None,
            _ => anyhow::bail!("message {} has a proposal without a state", r.id),
        };
        Ok(Self {
            id: r.id,
            role,
            text: r.text,
            timestamp: r.sent_at_ms,
            proposal,
            coach: r.coach_name.map(|name| CoachAttribution {
                name,
                avatar: r.coach_avatar.unwrap_or_default(),
            }),
            image_ref: r.image_ref,
        })
    }
}

const COLUMNS: &str = "id, role, text, sent_at_ms, proposal, proposal_state, coach_name, \
                       coach_avatar, image_ref";

async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    m: &ChatMessage,
    client_request_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chat_messages
            (id, user_id, role, text, sent_at_ms, proposal, proposal_state,
             coach_name, coach_avatar, image_ref, client_request_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(m.id)
    .bind(user_id)
    .bind(m.role.as_str())
    .bind(&m.text)
    .bind(m.timestamp)
    .bind(m.proposal.as_ref().map(|p| Json(&p.meal)))
    .bind(m.proposal.as_ref().map(|p| p.state.as_str()))
    .bind(m.coach.as_ref().map(|c| c.name.as_str()))
    .bind(m.coach.as_ref().map(|c| c.avatar.as_str()))
    .bind(&m.image_ref)
    .bind(client_request_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Stores a user turn and its reply together. Returns `false` when
/// `client_request_id` was already used by this user.
pub async fn insert_pair(
    db: &PgPool,
    user_id: Uuid,
    user_message: &ChatMessage,
    reply: &ChatMessage,
    client_request_id: Option<&str>,
) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin tx")?;
    match insert_tx(&mut tx, user_id, user_message, client_request_id).await {
        Ok(()) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            warn!(%user_id, "duplicate client_request_id");
            return Ok(false);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("insert user message")),
    }
    insert_tx(&mut tx, user_id, reply, None)
        .await
        .context("insert reply")?;
    tx.commit().await.context("commit tx")?;
    Ok(true)
}

pub async fn request_id_exists(db: &PgPool, user_id: Uuid, key: &str) -> anyhow::Result<bool> {
    let found: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM chat_messages WHERE user_id = $1 AND client_request_id = $2",
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(db)
    .await
    .context("lookup client_request_id")?;
    Ok(found.is_some())
}

/// The newest `limit` messages, returned oldest first.
pub async fn recent(db: &PgPool, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {COLUMNS} FROM chat_messages WHERE user_id = $1 \
         ORDER BY seq DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list chat_messages")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        match ChatMessage::try_from(row) {
            Ok(m) => out.push(m),
            Err(e) => warn!(error = %e, %user_id, "skipping unreadable message"),
        }
    }
    Ok(out)
}

pub async fn get_for_update_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<ChatMessage>> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {COLUMNS} FROM chat_messages WHERE id = $1 AND user_id = $2 FOR UPDATE"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .context("get chat_message")?;
    row.map(ChatMessage::try_from).transpose()
}

pub async fn update_proposal_tx(
    tx: &mut Transaction<'_, Postgres>,
    m: &ChatMessage,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE chat_messages SET text = $2, proposal = $3, proposal_state = $4 WHERE id = $1",
    )
    .bind(m.id)
    .bind(&m.text)
    .bind(m.proposal.as_ref().map(|p| Json(&p.meal)))
    .bind(m.proposal.as_ref().map(|p| p.state.as_str()))
    .execute(&mut **tx)
    .await
    .context("update chat_message proposal")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str, proposal: Option<Json<MealLog>>, state: Option<&str>) -> MessageRow {
        MessageRow {
            id: Uuid::new_v4(),
            role: role.into(),
            text: "t".into(),
            sent_at_ms: 5,
            proposal,
            proposal_state: state.map(str::to_string),
            coach_name: Some("Sora".into()),
            coach_avatar: None,
            image_ref: None,
        }
    }

    fn meal() -> MealLog {
        MealLog {
            id: Uuid::new_v4(),
            timestamp: 5,
            name: "Onigiri".into(),
            calories: 180,
            protein: 3.5,
            fat: 0.4,
            carbs: 39.0,
            image_ref: None,
            confirmation_message: None,
        }
    }

    #[test]
    fn row_maps_proposal_and_coach_snapshot() {
        let m = ChatMessage::try_from(row("model", Some(Json(meal())), Some("proposed"))).unwrap();
        assert!(m.is_log_confirmation());
        assert_eq!(m.coach.unwrap().avatar, "");
    }

    #[test]
    fn inconsistent_rows_are_rejected() {
        assert!(ChatMessage::try_from(row("assistant", None, None)).is_err());
        assert!(ChatMessage::try_from(row("model", Some(Json(meal())), None)).is_err());
        assert!(ChatMessage::try_from(row("model", None, Some("confirmed"))).is_err());
        assert!(ChatMessage::try_from(row("model", Some(Json(meal())), Some("maybe"))).is_err());
    }
}
