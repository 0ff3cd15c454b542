use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coach::CoachProfile;
use crate::llm::Role;
use crate::meals::dto::MealLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    Proposed,
    Confirmed,
    Discarded,
}

impl ProposalState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Confirmed => "confirmed",
            Self::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "confirmed" => Some(Self::Confirmed),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealProposal {
    pub meal: MealLog,
    pub state: ProposalState,
}

/// Coach identity at the time a reply was sent. A copy, not a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachAttribution {
    pub name: String,
    pub avatar: String,
}

impl From<&CoachProfile> for CoachAttribution {
    fn from(c: &CoachProfile) -> Self {
        Self {
            name: c.name.clone(),
            avatar: c.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub proposal: Option<MealProposal>,
    pub coach: Option<CoachAttribution>,
    pub image_ref: Option<String>,
}

impl ChatMessage {
    pub fn user(text: String, timestamp: i64, image_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text,
            timestamp,
            proposal: None,
            coach: None,
            image_ref,
        }
    }

    pub fn reply(text: String, timestamp: i64, coach: &CoachProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Model,
            text,
            timestamp,
            proposal: None,
            coach: Some(coach.into()),
            image_ref: None,
        }
    }

    /// True while the message carries a proposal awaiting the user.
    pub fn is_log_confirmation(&self) -> bool {
        matches!(&self.proposal, Some(p) if p.state == ProposalState::Proposed)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SubmitRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Bare base64 or a `data:` URL.
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub client_request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
    pub is_log_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<MealProposal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach: Option<CoachAttribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MessageView {
    pub fn new(m: ChatMessage, image_url: Option<String>) -> Self {
        Self {
            is_log_confirmation: m.is_log_confirmation(),
            id: m.id,
            role: m.role,
            text: m.text,
            timestamp: m.timestamp,
            proposal: m.proposal,
            coach: m.coach,
            image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Absent when the submission failed before it was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<MessageView>,
    pub reply: MessageView,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}
