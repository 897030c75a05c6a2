use crate::api::models::User;
use crate::app::{AppConfig, ConfigStore};

/// Credential plus the identity it belongs to. Lives from sign-in to sign-out.
pub struct SessionStore {
    config: AppConfig,
    store: ConfigStore,
    user: Option<User>,
}

impl SessionStore {
    pub fn new(config: AppConfig, store: ConfigStore) -> Self {
        Self { config, store, user: None }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Token left over from an earlier run, not yet validated.
    pub fn saved_token(&self) -> Option<&str> {
        if self.user.is_some() {
            return None;
        }
        self.config.token.as_deref()
    }

    /// Token of the signed-in user; `None` while signed out.
    pub fn token(&self) -> Option<&str> {
        self.user.as_ref().and(self.config.token.as_deref())
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn establish(&mut self, token: String, user: User) {
        if user.email.is_some() {
            self.config.email = user.email.clone();
        }
        self.config.token = Some(token);
        self.user = Some(user);
        self.persist();
    }

    pub fn update_user(&mut self, user: User) {
        if self.user.is_some() {
            self.user = Some(user);
        }
    }

    pub fn clear(&mut self) {
        self.user = None;
        if self.config.token.take().is_some() {
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.persist(&self.config) {
            log::warn!("failed to save session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::fixtures::user;

    #[test]
    fn token_is_only_live_once_a_user_is_attached() {
        let config = AppConfig { token: Some("old".into()), ..AppConfig::default() };
        let mut session = SessionStore::new(config, ConfigStore::Memory);
        assert_eq!(session.saved_token(), Some("old"));
        assert!(!session.is_signed_in());

        session.establish("new".into(), user("u1", "Ana"));
        assert_eq!(session.token(), Some("new"));
        assert_eq!(session.saved_token(), None);
    }

    #[test]
    fn clear_forgets_the_persisted_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut session = SessionStore::new(AppConfig::default(), ConfigStore::File(path.clone()));
        session.establish("tok".into(), user("u1", "Ana"));
        assert_eq!(AppConfig::load_from(&path).unwrap().token.as_deref(), Some("tok"));

        session.clear();
        assert!(session.user().is_none());
        assert_eq!(AppConfig::load_from(&path).unwrap().token, None);
    }
}
