use std::sync::Arc;

use crate::{
    core::hash::HashMap,
    core::uri::AppUri,
    protocol::Protocol,
    remote::remote::{Remote, RemoteId},
};

/// The engine's two-tier remote table (`spec.md` §4.1): a strong map keyed by URI (at most one
/// entry per URI) and a weak sequence (at most one entry per URI, enforced by [`Self::add_weak`]
/// as a debug assertion rather than a runtime check, since the caller — [`crate::engine::engine`]
/// — is expected to have already called [`Self::find_weak`] before dialing a second time).
#[derive(Default)]
pub struct RemoteTable {
    strong: HashMap<AppUri, Remote>,
    weak: Vec<Remote>,
}

impl RemoteTable {
    /// Inserts `remote` into the strong map. Panics if an entry already exists for its URI —
    /// per `spec.md` §4.1, the caller must check first (see [`Self::find_strong`]).
    pub fn add_strong(&mut self, remote: Remote) {
        let uri = remote.uri().clone();
        if self.strong.contains_key(&uri) {
            panic!("strong remote already exists for uri: {uri}");
        }
        self.strong.insert(uri, remote);
    }

    /// Appends `remote` to the weak sequence. Debug-asserts no existing weak entry shares its
    /// URI, matching the precondition in `spec.md` §4.1.
    pub fn add_weak(&mut self, remote: Remote) {
        debug_assert!(
            self.find_weak(remote.uri()).is_none(),
            "weak remote already exists for uri: {}",
            remote.uri()
        );
        self.weak.push(remote);
    }

    /// Removes the weak remote with the given identity, if present.
    pub fn remove_weak(&mut self, id: RemoteId) -> Option<Remote> {
        let pos = self.weak.iter().position(|r| r.id() == id)?;
        Some(self.weak.remove(pos))
    }

    /// Removes the strong remote at `uri`, but only if its identity matches `id`. A mismatch
    /// means a different remote has since taken over that URI (`spec.md` §4.4's
    /// `on_remote_closed`, step 3) — in that case the table is left untouched and `None` is
    /// returned, so the caller knows to destroy `id`'s remote without removing anything.
    pub fn remove_strong_by_id(&mut self, id: RemoteId) -> Option<Remote> {
        let uri = self
            .strong
            .iter()
            .find(|(_, r)| r.id() == id)
            .map(|(uri, _)| uri.clone())?;
        self.strong.remove(&uri)
    }

    /// Moves a weak remote to the strong map. Returns `false` if no weak remote with that
    /// identity exists.
    pub fn promote(&mut self, id: RemoteId) -> bool {
        match self.remove_weak(id) {
            Some(remote) => {
                self.add_strong(remote);
                true
            }
            None => false,
        }
    }

    pub fn find_strong(&self, uri: &AppUri) -> Option<&Remote> {
        self.strong.get(uri)
    }

    pub fn find_strong_mut(&mut self, uri: &AppUri) -> Option<&mut Remote> {
        self.strong.get_mut(uri)
    }

    pub fn find_weak(&self, uri: &AppUri) -> Option<&Remote> {
        self.weak.iter().find(|r| r.uri() == uri)
    }

    pub fn find_weak_mut(&mut self, uri: &AppUri) -> Option<&mut Remote> {
        self.weak.iter_mut().find(|r| r.uri() == uri)
    }

    pub fn find_weak_by_id(&self, id: RemoteId) -> Option<&Remote> {
        self.weak.iter().find(|r| r.id() == id)
    }

    pub fn find_weak_by_id_mut(&mut self, id: RemoteId) -> Option<&mut Remote> {
        self.weak.iter_mut().find(|r| r.id() == id)
    }

    /// Strong-then-weak lookup, per `spec.md` §4.1.
    pub fn find_any(&self, uri: &AppUri) -> Option<&Remote> {
        self.find_strong(uri).or_else(|| self.find_weak(uri))
    }

    /// Same as [`Self::find_any`], but ignores a remote matching `exclude`. Used by the
    /// promotion path to ask "is there *another* channel to this peer", since at that point the
    /// remote being promoted is itself still sitting in the weak sequence (`spec.md` §4.3).
    pub fn find_any_except(&self, uri: &AppUri, exclude: RemoteId) -> Option<&Remote> {
        self.strong
            .get(uri)
            .filter(|r| r.id() != exclude)
            .or_else(|| self.weak.iter().find(|r| r.uri() == uri && r.id() != exclude))
    }

    /// Removes and returns whichever remote (strong or weak) currently occupies `uri`, other
    /// than `exclude`. Used when a promotion wins the tiebreak and must evict the channel it is
    /// replacing (`spec.md` §4.3/§4.4).
    pub fn take_any_except(&mut self, uri: &AppUri, exclude: RemoteId) -> Option<Remote> {
        if let Some(r) = self.strong.get(uri) {
            if r.id() != exclude {
                return self.strong.remove(uri);
            }
        }
        if let Some(pos) = self
            .weak
            .iter()
            .position(|r| r.uri() == uri && r.id() != exclude)
        {
            return Some(self.weak.remove(pos));
        }
        None
    }

    /// Looks a remote up by identity regardless of which table it sits in. Used by
    /// `receive_msg_from_remote` to reply to the remote a message arrived on, since that remote
    /// may legitimately still be weak (an inbound `start_graph` can race the local promotion).
    pub fn find_by_id(&self, id: RemoteId) -> Option<&Remote> {
        self.strong
            .values()
            .find(|r| r.id() == id)
            .or_else(|| self.weak.iter().find(|r| r.id() == id))
    }

    pub fn is_weak(&self, id: RemoteId) -> bool {
        self.weak.iter().any(|r| r.id() == id)
    }

    pub fn is_strong(&self, id: RemoteId) -> bool {
        self.strong.values().any(|r| r.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.strong.is_empty() && self.weak.is_empty()
    }

    pub fn strong_len(&self) -> usize {
        self.strong.len()
    }

    pub fn weak_len(&self) -> usize {
        self.weak.len()
    }

    /// All protocols currently owned by either table, for the engine shutdown drain
    /// (`spec.md` §4.7).
    pub fn all_protocols(&self) -> Vec<Arc<dyn Protocol>> {
        self.strong
            .values()
            .map(|r| r.connection().protocol())
            .chain(self.weak.iter().map(|r| r.connection().protocol()))
            .collect()
    }
}
