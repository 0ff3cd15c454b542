use thiserror::Error;

/// Failure talking to the generation service itself, as opposed to a
/// well-delivered but unusable answer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation request failed: {0}")]
    Network(String),
    #[error("generation service sent an unreadable body: {0}")]
    Body(String),
    #[error("generation service returned no image")]
    NoImage,
}

impl TransportError {
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: truncate_body(body),
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "食".repeat(200);
        let err = TransportError::from_status(503, &body);
        let TransportError::Status { status, body } = err else {
            panic!("expected status variant");
        };
        assert_eq!(status, 503);
        assert!(body.ends_with("..."));
        assert!(body.len() <= 303);
    }
}
