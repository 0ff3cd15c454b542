use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::TokenPair;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_is_flat() {
        let resp = AuthResponse {
            tokens: TokenPair {
                access_token: "a".into(),
                refresh_token: "r".into(),
            },
            user: PublicUser {
                id: Uuid::nil(),
                email: "yui@example.com".into(),
            },
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["access_token"], "a");
        assert_eq!(v["refresh_token"], "r");
        assert_eq!(v["user"]["email"], "yui@example.com");
    }
}
