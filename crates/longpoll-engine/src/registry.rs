use std::collections::BTreeMap;
use std::sync::Arc;

use longpoll_core::{Credential, SessionName};

use crate::error::EngineError;
use crate::session::Session;

/// The fixed set of sessions, built once at startup from the configured token table.
///
/// No sessions are added or removed afterwards.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionName, Arc<Session>>,
}

impl SessionRegistry {
    /// Build the registry. Names and tokens must be non-empty and unique.
    pub fn new(
        entries: impl IntoIterator<Item = (SessionName, Credential)>,
    ) -> Result<Self, EngineError> {
        let mut sessions: BTreeMap<SessionName, Arc<Session>> = BTreeMap::new();
        for (name, credential) in entries {
            if name.is_empty() {
                return Err(EngineError::EmptyName);
            }
            if credential.is_empty() {
                return Err(EngineError::EmptyCredential(name.to_string()));
            }
            if sessions.contains_key(&name) {
                return Err(EngineError::DuplicateName(name.to_string()));
            }
            if sessions
                .values()
                .any(|s| s.credential().same_secret(&credential))
            {
                return Err(EngineError::DuplicateCredential(name.to_string()));
            }
            let session = Arc::new(Session::new(name.clone(), credential));
            sessions.insert(name, session);
        }
        Ok(Self { sessions })
    }

    /// Convenience for `(name, token)` string pairs.
    pub fn from_pairs<N, T>(pairs: impl IntoIterator<Item = (N, T)>) -> Result<Self, EngineError>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(n, t)| (SessionName::new(n), Credential::new(t))),
        )
    }

    pub fn get(&self, name: &SessionName) -> Option<&Arc<Session>> {
        self.sessions.get(name)
    }

    /// Find the session a presented token belongs to.
    ///
    /// Every entry is compared so lookup time does not depend on which one matches.
    pub fn resolve(&self, token: &str) -> Option<&Arc<Session>> {
        let mut found = None;
        for session in self.sessions.values() {
            if session.credential().matches(token) && found.is_none() {
                found = Some(session);
            }
        }
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions.values()
    }

    pub fn names(&self) -> Vec<SessionName> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
