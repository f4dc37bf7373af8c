use uuid::Uuid;

use crate::domain::accounter::accounter::{ResourceAccounter, SyncSession};
use crate::domain::accounter::view::ViewToken;
use crate::domain::resource::assignment::AssignmentMap;
use crate::domain::utils::id::AppUid;
use crate::error::{Error, Result};

/// The sync-session half of the accounter contract.
///
/// A session is a single-producer window bracketed by
/// `sync_start -> (sync_acquire_resources per app)* -> sync_commit | sync_abort`.
/// While a session is open, ordinary bookings skip the availability check:
/// availability is owned by the session.
impl ResourceAccounter {
    /// Opens a session: allocates a fresh view and copies the current
    /// assignments of every application in `running` into it. Returns the
    /// session view token.
    pub fn sync_start(&self, running: &[AppUid]) -> Result<ViewToken> {
        {
            let guard = self.inner.read().expect("accounter lock poisoned");
            if guard.sync.is_some() {
                return Err(Error::Conflict("a sync session is already open".to_string()));
            }
        }
        let label = format!("sync-{}", Uuid::new_v4());
        let token = self.get_view(&label)?;
        {
            let mut guard = self.inner.write().expect("accounter lock poisoned");
            guard.sync = Some(SyncSession { token, label: label.clone(), acquired: Vec::new() });
        }

        // Re-book the live assignments of still-running applications; their
        // shares must be reproduced exactly in the session view.
        let live = self.live_view();
        for uid in running {
            let Some(map) = self.assignments_of(*uid, live) else {
                continue;
            };
            if let Err(e) = self.book_resources(*uid, &map, token, false) {
                log::error!("SyncStart: cannot copy [{}] into the session view: {}", uid, e);
                self.sync_abort()?;
                return Err(Error::Fatal(format!("sync session init failed for [{}]", uid)));
            }
        }
        log::debug!("SyncStart: session '{}' open as {}", label, token);
        Ok(token)
    }

    /// Re-books the given application's next working mode into the session
    /// view. The map must carry the shares recorded by the scheduling run;
    /// a failure to reproduce them aborts this application's acquisition.
    pub fn sync_acquire_resources(&self, app: AppUid, next_map: &AssignmentMap) -> Result<AssignmentMap> {
        let token = self.open_session_token()?;
        // An application may appear with a stale copy from sync_start when
        // it kept running through scheduling; drop it before re-booking.
        self.release_resources(app, token)?;
        let booked = self.book_resources(app, next_map, token, false)?;
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        if let Some(session) = guard.sync.as_mut() {
            session.acquired.push(app);
        }
        Ok(booked)
    }

    /// Promotes the session view to live and closes the session.
    pub fn sync_commit(&self) -> Result<()> {
        let token = self.open_session_token()?;
        self.set_view(token)?;
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        let session = guard.sync.take();
        if let Some(s) = session {
            log::info!("SyncCommit: session '{}' promoted ({} acquisitions)", s.label, s.acquired.len());
        }
        Ok(())
    }

    /// Drops the session view; every query result returns to what it was
    /// before `sync_start`.
    pub fn sync_abort(&self) -> Result<()> {
        let token = self.open_session_token()?;
        {
            let mut guard = self.inner.write().expect("accounter lock poisoned");
            guard.sync = None;
        }
        self.put_view(token)?;
        log::warn!("SyncAbort: session view {} dropped", token);
        Ok(())
    }

    pub fn sync_in_progress(&self) -> bool {
        self.inner.read().expect("accounter lock poisoned").sync.is_some()
    }

    /// Token of the open session view.
    pub fn sync_view(&self) -> Option<ViewToken> {
        self.inner.read().expect("accounter lock poisoned").sync.as_ref().map(|s| s.token)
    }

    fn open_session_token(&self) -> Result<ViewToken> {
        self.inner
            .read()
            .expect("accounter lock poisoned")
            .sync
            .as_ref()
            .map(|s| s.token)
            .ok_or_else(|| Error::Conflict("no sync session open".to_string()))
    }
}
