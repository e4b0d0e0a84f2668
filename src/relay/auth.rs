// relay/auth.rs
use async_trait::async_trait;

/// Decides whether a client may attach under `client_id`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorize(&self, client_id: &str, token: Option<&str>) -> bool;
}

/// Shared-key check: the controller id needs the controller key, every other
/// id needs the client key. An unset key admits nobody.
pub struct KeyAuthenticator {
    controller_id: String,
    controller_key: Option<String>,
    client_key: Option<String>,
}

impl KeyAuthenticator {
    pub fn new(
        controller_id: impl Into<String>,
        controller_key: Option<String>,
        client_key: Option<String>,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            controller_key,
            client_key,
        }
    }
}

#[async_trait]
impl Authenticator for KeyAuthenticator {
    async fn authorize(&self, client_id: &str, token: Option<&str>) -> bool {
        let expected = if client_id == self.controller_id {
            self.controller_key.as_deref()
        } else {
            self.client_key.as_deref()
        };
        matches!((expected, token), (Some(key), Some(token)) if key == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_are_checked_per_role() {
        let auth = KeyAuthenticator::new("LLM", Some("secret".into()), Some("abc".into()));
        assert!(auth.authorize("LLM", Some("secret")).await);
        assert!(!auth.authorize("LLM", Some("abc")).await);
        assert!(auth.authorize("ac_1", Some("abc")).await);
        assert!(!auth.authorize("ac_1", None).await);
    }

    #[tokio::test]
    async fn unset_key_rejects_everyone() {
        let auth = KeyAuthenticator::new("LLM", None, Some("abc".into()));
        assert!(!auth.authorize("LLM", Some("")).await);
        assert!(!auth.authorize("LLM", None).await);
    }
}
