//! Concurrent credential store keyed by protection space.
//!
//! The store is shared by every task of a session (and may be shared across
//! sessions). Reads never block each other; writes are caller-driven and the
//! task engine never mutates the store on its own.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::{debug, instrument};

use super::{Credential, Persistence, ProtectionSpace};

/// Credential store.
///
/// Each protection space maps to an ordered list of credentials. The first
/// entry is the space's default credential, returned by [`lookup`](Self::lookup).
///
/// # Thread Safety
///
/// `CredentialStore` is `Send + Sync`; wrap it in `Arc` to share it between
/// sessions and tasks. Methods clone data out of the map and never hold a
/// shard lock across a call boundary.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: DashMap<ProtectionSpace, Vec<Credential>>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default credential for `space`.
    #[must_use]
    pub fn lookup(&self, space: &ProtectionSpace) -> Option<Credential> {
        self.entries
            .get(space)
            .and_then(|credentials| credentials.first().cloned())
    }

    /// Returns every credential stored for `space`, default first.
    #[must_use]
    pub fn credentials(&self, space: &ProtectionSpace) -> Vec<Credential> {
        self.entries
            .get(space)
            .map(|credentials| credentials.clone())
            .unwrap_or_default()
    }

    /// Stores `credential` for `space` with the given persistence.
    ///
    /// A credential that authenticates identically to an existing entry
    /// replaces it in place. Credentials with [`Persistence::None`] are not
    /// retained.
    ///
    /// Returns true if the credential was stored.
    #[instrument(level = "debug", skip(self, credential), fields(space = %space))]
    pub fn put(
        &self,
        space: ProtectionSpace,
        credential: Credential,
        persistence: Persistence,
    ) -> bool {
        if persistence == Persistence::None {
            debug!("credential not retained: persistence is none");
            return false;
        }
        let credential = credential.with_persistence(persistence);
        let mut credentials = self.entries.entry(space).or_default();
        match credentials.iter().position(|existing| *existing == credential) {
            Some(index) => credentials[index] = credential,
            None => credentials.push(credential),
        }
        true
    }

    /// Moves `credential` to the front of `space`'s list, storing it first if
    /// needed.
    ///
    /// Returns false for [`Persistence::None`] credentials, which are never
    /// retained.
    pub fn set_default(&self, space: ProtectionSpace, credential: Credential) -> bool {
        if credential.persistence() == Persistence::None {
            return false;
        }
        let mut credentials = self.entries.entry(space).or_default();
        credentials.retain(|existing| *existing != credential);
        credentials.insert(0, credential);
        true
    }

    /// Removes every credential for `space`, returning them.
    pub fn remove(&self, space: &ProtectionSpace) -> Vec<Credential> {
        self.entries
            .remove(space)
            .map(|(_, credentials)| credentials)
            .unwrap_or_default()
    }

    /// Removes one credential from `space`. Returns true if it was present.
    pub fn remove_credential(&self, space: &ProtectionSpace, credential: &Credential) -> bool {
        let removed = match self.entries.get_mut(space) {
            Some(mut credentials) => {
                let before = credentials.len();
                credentials.retain(|existing| existing != credential);
                before != credentials.len()
            }
            None => false,
        };
        self.entries.remove_if(space, |_, credentials| credentials.is_empty());
        removed
    }

    /// Returns the next credential to try for `space`, skipping `excluding`.
    ///
    /// Candidates are ranked:
    /// 1. credentials stored for `space` itself, in stored order;
    /// 2. credentials for the same endpoint and scheme under another realm;
    /// 3. credentials for the same endpoint under another scheme.
    ///
    /// Only credentials that can answer `space`'s scheme are considered.
    #[must_use]
    pub fn next_candidate(
        &self,
        space: &ProtectionSpace,
        excluding: &HashSet<Credential>,
    ) -> Option<Credential> {
        let usable = |credential: &Credential| {
            credential.answers(space.scheme()) && !excluding.contains(credential)
        };

        if let Some(exact) = self
            .entries
            .get(space)
            .and_then(|credentials| credentials.iter().find(|c| usable(c)).cloned())
        {
            return Some(exact);
        }

        let mut broadened: Vec<(u8, Option<String>, usize, Credential)> = Vec::new();
        for entry in &self.entries {
            let candidate_space = entry.key();
            if candidate_space == space || !candidate_space.same_origin(space) {
                continue;
            }
            let rank = u8::from(candidate_space.scheme() != space.scheme());
            for (order, credential) in entry.value().iter().enumerate() {
                if usable(credential) {
                    broadened.push((
                        rank,
                        candidate_space.realm().map(str::to_string),
                        order,
                        credential.clone(),
                    ));
                }
            }
        }
        broadened.sort_by(|a, b| (a.0, &a.1, a.2).cmp(&(b.0, &b.1, b.2)));
        broadened.into_iter().map(|(_, _, _, credential)| credential).next()
    }

    /// Drops every [`Persistence::ForSession`] credential.
    pub fn clear_session_scoped(&self) {
        self.entries.retain(|_, credentials| {
            credentials.retain(|c| c.persistence() != Persistence::ForSession);
            !credentials.is_empty()
        });
    }

    /// Snapshot of every [`Persistence::Permanent`] credential, for
    /// caller-owned persistence.
    #[must_use]
    pub fn permanent_entries(&self) -> Vec<(ProtectionSpace, Credential)> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let space = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .filter(|c| c.persistence() == Persistence::Permanent)
                    .map(|c| (space.clone(), c.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Every protection space with at least one credential.
    #[must_use]
    pub fn spaces(&self) -> Vec<ProtectionSpace> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Total number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
