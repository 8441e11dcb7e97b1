use std::sync::RwLock;

use hashbrown::HashMap;
use uuid::Uuid;

/// Issues and verifies opaque bearer tokens for subjects.
///
/// The upload core never looks at tokens itself, it only consumes the
/// subject id a provider resolved.
pub trait IdentityProvider: Sync + Send + 'static {
    fn issue(&self, subject: Uuid) -> String;

    fn validate(&self, token: &str) -> Option<Uuid>;
}

/// A fixed token table, optionally seeded from the config file.
#[derive(Default)]
pub struct TokenTable {
    tokens: RwLock<HashMap<String, Uuid>>,
}

impl TokenTable {
    pub fn new<I>(seed: I) -> Self
    where
        I: IntoIterator<Item = (String, Uuid)>,
    {
        Self {
            tokens: RwLock::new(seed.into_iter().collect()),
        }
    }
}

impl IdentityProvider for TokenTable {
    fn issue(&self, subject: Uuid) -> String {
        let mut raw = Vec::with_capacity(32);
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        let token = base64::encode_config(&raw, base64::URL_SAFE_NO_PAD);

        let mut lock = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        lock.insert(token.clone(), subject);

        token
    }

    fn validate(&self, token: &str) -> Option<Uuid> {
        let lock = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        lock.get(token).copied()
    }
}
