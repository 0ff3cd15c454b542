use crate::llm::{Role, Turn};

use super::dto::ChatMessage;

/// Most turns ever replayed to the conversational model.
pub const HISTORY_CAP: usize = 30;
/// Turns given to the intake classifier for resolving references.
pub const INTAKE_CONTEXT_TURNS: usize = 5;

/// A stored turn before sanitizing. `text` is `None` for non-text content
/// such as an image-only message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTurn<'a> {
    pub role: Role,
    pub text: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for RawTurn<'a> {
    fn from(m: &'a ChatMessage) -> Self {
        Self {
            role: m.role,
            text: Some(m.text.as_str()),
        }
    }
}

/// Produces a transcript the model accepts:
/// at most `cap` of the most recent turns, no blank turns, strictly
/// alternating roles (a turn repeating the previous kept role is dropped),
/// and never ending on a user turn, since the caller appends one.
pub fn sanitize(turns: &[RawTurn<'_>], cap: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(cap);
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len() - start);

    for turn in &turns[start..] {
        let Some(text) = turn.text.filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        if out.last().is_some_and(|prev| prev.role == turn.role) {
            continue;
        }
        out.push(Turn {
            role: turn.role,
            text: text.to_string(),
        });
    }

    if out.last().is_some_and(|t| t.role == Role::User) {
        out.pop();
    }
    out
}

pub fn sanitize_messages(messages: &[ChatMessage], cap: usize) -> Vec<Turn> {
    let raw: Vec<RawTurn<'_>> = messages.iter().map(RawTurn::from).collect();
    sanitize(&raw, cap)
}

pub fn tail(turns: &[Turn], n: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(n)..]
}
