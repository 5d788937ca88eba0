//! Editable state for the page currently open.
//!
//! One [`ContentSession`] follows whichever page id the navigation layer
//! activates. Every network call is tagged with the activation generation it
//! started under; a completion whose generation is no longer current is
//! dropped without touching state. The state lock is never held across a
//! network await, so saves, uploads and deletes interleave freely.
//!
//! Page writes are the exception: every `save_page` goes through a separate
//! write lock, and its record is built only once that lock is held. Two full
//! records therefore never race each other to the store.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use shared::{
    domain::{Material, Page, PageId},
    protocol::PageRecord,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{ContentClient, ContentError, Origin, UploadFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Viewing,
    Editing,
    Saving,
    NotFound,
}

/// Attachments can be managed whenever a page is on screen.
const ATTACHMENT_PHASES: &[Phase] = &[Phase::Viewing, Phase::Editing, Phase::Saving];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Follow each successful upload with a save of the held page so the
    /// attachment list survives a reload. Off by default: the upload endpoint
    /// is trusted to record the association itself.
    pub persist_attachment_list_on_upload: bool,
}

/// Whether a finished operation was applied or dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Discarded,
}

/// Toast-level notifications for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Loaded { page_id: PageId, origin: Origin },
    NotFound { page_id: PageId },
    Saved { page_id: PageId },
    /// The save was only echoed locally and may not have been persisted.
    SaveDegraded { page_id: PageId, reason: String },
    SaveFailed { page_id: PageId, reason: String },
    Uploaded { page_id: PageId, url: String },
    /// `url` is session-local and will not survive a restart.
    UploadDegraded {
        page_id: PageId,
        url: String,
        reason: String,
    },
    UploadFailed { page_id: PageId, reason: String },
    Deleted { page_id: PageId, url: String },
    /// Removed locally, but the store never confirmed the delete.
    DeleteUnconfirmed {
        page_id: PageId,
        url: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no page is active")]
    NoActivePage,
    #[error("cannot {operation} while {phase:?}")]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Read-only view model handed to presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub page_id: Option<PageId>,
    pub phase: Phase,
    pub page: Option<Page>,
    pub draft_markdown: String,
    pub uploads_in_flight: usize,
    pub deleting: BTreeSet<String>,
}

impl SessionSnapshot {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_editing(&self) -> bool {
        self.phase == Phase::Editing
    }

    pub fn is_saving(&self) -> bool {
        self.phase == Phase::Saving
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads_in_flight > 0
    }

    pub fn is_deleting(&self, url: &str) -> bool {
        self.deleting.contains(url)
    }
}

struct SessionState {
    generation: u64,
    page_id: Option<PageId>,
    phase: Phase,
    page: Option<Page>,
    draft_markdown: String,
    uploads_in_flight: usize,
    // Two deletes of one url are not merged; the flag clears when both finish.
    deleting: BTreeMap<String, usize>,
}

impl SessionState {
    fn idle(generation: u64) -> Self {
        Self {
            generation,
            page_id: None,
            phase: Phase::Idle,
            page: None,
            draft_markdown: String::new(),
            uploads_in_flight: 0,
            deleting: BTreeMap::new(),
        }
    }

    fn ticket(&self) -> Result<Ticket, SessionError> {
        let page_id = self.page_id.clone().ok_or(SessionError::NoActivePage)?;
        Ok(Ticket {
            generation: self.generation,
            page_id,
        })
    }

    fn require(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), SessionError> {
        if self.page_id.is_none() {
            return Err(SessionError::NoActivePage);
        }
        if !allowed.contains(&self.phase) {
            return Err(SessionError::InvalidTransition {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn finish_delete(&mut self, url: &str) {
        if let Some(count) = self.deleting.get_mut(url) {
            *count -= 1;
            if *count == 0 {
                self.deleting.remove(url);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Ticket {
    generation: u64,
    page_id: PageId,
}

pub struct ContentSession<C: ContentClient + ?Sized> {
    client: Arc<C>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    writes: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl<C: ContentClient + ?Sized> ContentSession<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self::with_options(client, SessionOptions::default())
    }

    pub fn with_options(client: Arc<C>, options: SessionOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client,
            options,
            state: Mutex::new(SessionState::idle(0)),
            writes: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.state.lock().await;
        SessionSnapshot {
            page_id: guard.page_id.clone(),
            phase: guard.phase,
            page: guard.page.clone(),
            draft_markdown: guard.draft_markdown.clone(),
            uploads_in_flight: guard.uploads_in_flight,
            deleting: guard.deleting.keys().cloned().collect(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn is_current(state: &SessionState, ticket: &Ticket, operation: &str) -> bool {
        if state.generation == ticket.generation {
            return true;
        }
        debug!(
            page_id = %ticket.page_id,
            operation,
            "discarding completion for a page that is no longer active"
        );
        false
    }

    /// Opens `page_id`, abandoning whatever was in flight for the previous one.
    pub async fn activate(&self, page_id: PageId) -> Completion {
        let ticket = {
            let mut guard = self.state.lock().await;
            let generation = guard.generation + 1;
            *guard = SessionState::idle(generation);
            guard.page_id = Some(page_id.clone());
            guard.phase = Phase::Loading;
            Ticket {
                generation,
                page_id,
            }
        };

        let fetched = self.client.fetch_page(&ticket.page_id).await;

        let mut guard = self.state.lock().await;
        if !Self::is_current(&guard, &ticket, "activate") {
            return Completion::Discarded;
        }
        match fetched {
            Ok(synced) => {
                let page = synced.value.normalize();
                guard.draft_markdown = page.markdown.clone();
                guard.page = Some(page);
                guard.phase = Phase::Viewing;
                drop(guard);
                info!(page_id = %ticket.page_id, "page loaded");
                self.emit(SessionEvent::Loaded {
                    page_id: ticket.page_id,
                    origin: synced.origin,
                });
            }
            Err(err) => {
                guard.phase = Phase::NotFound;
                drop(guard);
                warn!(page_id = %ticket.page_id, error = %err, "page not found");
                self.emit(SessionEvent::NotFound {
                    page_id: ticket.page_id,
                });
            }
        }
        Completion::Applied
    }

    /// Drops the view model, as when the page view is closed.
    pub async fn deactivate(&self) {
        let mut guard = self.state.lock().await;
        let generation = guard.generation + 1;
        *guard = SessionState::idle(generation);
    }

    pub async fn begin_edit(&self) -> Result<(), SessionError> {
        let mut guard = self.state.lock().await;
        guard.require("begin editing", &[Phase::Viewing, Phase::Editing])?;
        if guard.phase == Phase::Editing {
            return Ok(());
        }
        guard.draft_markdown = guard
            .page
            .as_ref()
            .map(|page| page.markdown.clone())
            .unwrap_or_default();
        guard.phase = Phase::Editing;
        Ok(())
    }

    pub async fn update_draft(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let mut guard = self.state.lock().await;
        guard.require("update the draft", &[Phase::Editing])?;
        guard.draft_markdown = text.into();
        Ok(())
    }

    /// Leaves editing without saving; the draft snaps back to the held markdown.
    pub async fn cancel_edit(&self) -> Result<(), SessionError> {
        let mut guard = self.state.lock().await;
        guard.require("cancel editing", &[Phase::Editing])?;
        guard.draft_markdown = guard
            .page
            .as_ref()
            .map(|page| page.markdown.clone())
            .unwrap_or_default();
        guard.phase = Phase::Viewing;
        Ok(())
    }

    pub async fn save(&self) -> Result<Completion, SessionError> {
        let ticket = {
            let mut guard = self.state.lock().await;
            guard.require("save", &[Phase::Editing])?;
            let ticket = guard.ticket()?;
            guard.phase = Phase::Saving;
            ticket
        };

        let write = self.writes.lock().await;
        let candidate = {
            let guard = self.state.lock().await;
            if !Self::is_current(&guard, &ticket, "save") {
                return Ok(Completion::Discarded);
            }
            let mut candidate = guard.page.clone().ok_or(SessionError::NoActivePage)?;
            candidate.markdown = guard.draft_markdown.clone();
            candidate
        };

        let saved = self
            .client
            .save_page(&ticket.page_id, PageRecord::from(candidate))
            .await;
        drop(write);

        let mut guard = self.state.lock().await;
        if !Self::is_current(&guard, &ticket, "save") {
            return Ok(Completion::Discarded);
        }
        match saved {
            Ok(synced) => {
                let mut page = synced.value.normalize();
                // The attachment list belongs to upload/delete, which may have
                // finished while this save was in flight.
                if let Some(held) = guard.page.take() {
                    page.materials = held.materials;
                }
                guard.draft_markdown = page.markdown.clone();
                guard.page = Some(page);
                guard.phase = Phase::Viewing;
                drop(guard);
                match synced.origin {
                    Origin::Remote => {
                        info!(page_id = %ticket.page_id, "page saved");
                        self.emit(SessionEvent::Saved {
                            page_id: ticket.page_id,
                        });
                    }
                    Origin::Fallback { reason } => {
                        self.emit(SessionEvent::SaveDegraded {
                            page_id: ticket.page_id,
                            reason,
                        });
                    }
                }
                Ok(Completion::Applied)
            }
            Err(err) => {
                guard.phase = Phase::Editing;
                drop(guard);
                warn!(page_id = %ticket.page_id, error = %err, "save failed; draft kept");
                self.emit(SessionEvent::SaveFailed {
                    page_id: ticket.page_id,
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    pub async fn upload(&self, file: UploadFile) -> Result<Completion, SessionError> {
        let ticket = {
            let mut guard = self.state.lock().await;
            guard.require("upload", ATTACHMENT_PHASES)?;
            let ticket = guard.ticket()?;
            guard.uploads_in_flight += 1;
            ticket
        };

        let file_name = file.file_name.clone();
        let uploaded = self.client.upload_file(file, &ticket.page_id).await;

        let mut guard = self.state.lock().await;
        if !Self::is_current(&guard, &ticket, "upload") {
            return Ok(Completion::Discarded);
        }
        guard.uploads_in_flight = guard.uploads_in_flight.saturating_sub(1);

        let synced = match uploaded {
            Ok(synced) => synced,
            Err(err) => {
                drop(guard);
                warn!(page_id = %ticket.page_id, error = %err, "upload failed");
                self.emit(SessionEvent::UploadFailed {
                    page_id: ticket.page_id,
                    reason: err.to_string(),
                });
                return Err(err.into());
            }
        };

        let url = synced.value.url;
        if let Some(page) = guard.page.as_mut() {
            page.materials.push(Material::from_upload(file_name, url.clone()));
        }
        drop(guard);

        match synced.origin {
            Origin::Remote => self.emit(SessionEvent::Uploaded {
                page_id: ticket.page_id.clone(),
                url,
            }),
            Origin::Fallback { reason } => self.emit(SessionEvent::UploadDegraded {
                page_id: ticket.page_id.clone(),
                url,
                reason,
            }),
        }

        if self.options.persist_attachment_list_on_upload {
            self.persist_attachment_list(ticket).await
        } else {
            Ok(Completion::Applied)
        }
    }

    /// Saves the held page, never the draft. If a user save is in flight this
    /// waits for it and then sends the markdown that save produced.
    async fn persist_attachment_list(&self, ticket: Ticket) -> Result<Completion, SessionError> {
        let write = self.writes.lock().await;
        let record = {
            let guard = self.state.lock().await;
            if !Self::is_current(&guard, &ticket, "persist attachments") {
                return Ok(Completion::Discarded);
            }
            match guard.page.as_ref() {
                Some(page) => PageRecord::from(page),
                None => return Ok(Completion::Applied),
            }
        };

        let saved = self.client.save_page(&ticket.page_id, record).await;
        drop(write);

        let mut guard = self.state.lock().await;
        if !Self::is_current(&guard, &ticket, "persist attachments") {
            return Ok(Completion::Discarded);
        }
        match saved {
            Ok(synced) => {
                let materials = synced.value.normalize().materials;
                if let Some(page) = guard.page.as_mut() {
                    page.materials = materials;
                }
                drop(guard);
                if let Origin::Fallback { reason } = synced.origin {
                    self.emit(SessionEvent::SaveDegraded {
                        page_id: ticket.page_id,
                        reason,
                    });
                }
                Ok(Completion::Applied)
            }
            Err(err) => {
                drop(guard);
                warn!(page_id = %ticket.page_id, error = %err, "failed to persist attachment list");
                self.emit(SessionEvent::SaveFailed {
                    page_id: ticket.page_id,
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Advisory delete: the local entry goes whether or not the store confirms.
    pub async fn delete_attachment(&self, url: &str) -> Result<Completion, SessionError> {
        let ticket = {
            let mut guard = self.state.lock().await;
            guard.require("delete an attachment", ATTACHMENT_PHASES)?;
            let ticket = guard.ticket()?;
            *guard.deleting.entry(url.to_string()).or_insert(0) += 1;
            ticket
        };

        let deleted = self.client.delete_file(url, &ticket.page_id).await;

        let mut guard = self.state.lock().await;
        if !Self::is_current(&guard, &ticket, "delete") {
            return Ok(Completion::Discarded);
        }
        guard.finish_delete(url);
        if let Some(page) = guard.page.as_mut() {
            page.remove_material(url);
        }
        drop(guard);

        match deleted {
            Ok(()) => self.emit(SessionEvent::Deleted {
                page_id: ticket.page_id,
                url: url.to_string(),
            }),
            Err(err) => {
                warn!(page_id = %ticket.page_id, url, error = %err, "delete not confirmed by store");
                self.emit(SessionEvent::DeleteUnconfirmed {
                    page_id: ticket.page_id,
                    url: url.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(Completion::Applied)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
