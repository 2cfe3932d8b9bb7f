//! Room State Cache
//!
//! In-memory authoritative state per channel: the current document, the
//! current page, and the three annotation working sets. One room per
//! channel, created lazily on first reference and never destroyed; eviction
//! only trims entries within a room's collections, never the room itself.
//!
//! # Write-through
//!
//! Every mutation applies to the in-memory collection first, then rides the
//! room's write queue to the annotation store. Each room owns one writer
//! task consuming an unbounded mpsc, so a slow storage write never blocks
//! the mutation path or another room, while per-room write ordering is
//! preserved (single writer per room). Persistence failure does not roll
//! back the in-memory change; the periodic flush sweep is the retry path.
//!
//! # Locking
//!
//! Each room sits behind its own `tokio::sync::Mutex`. A mutation's
//! in-memory apply happens entirely under that lock, before any suspension
//! point, which gives the run-to-completion semantics the protocol layer
//! relies on for apply-then-broadcast atomicity. Mutations are always
//! scoped to one channel, so there is no cross-room locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::backend::error::BackendError;
use crate::backend::store::{AnnotationStore, LoadedAnnotations};
use crate::shared::{Annotation, AnnotationKind, DrawOp, RoomSnapshot, StickyOp, TextOp};

/// A persistence job queued for a room's writer task.
#[derive(Debug)]
pub enum WriteJob {
    Upsert {
        channel_id: String,
        pdf_id: String,
        annotation: Annotation,
    },
    /// Bulk flush of a working set, one transaction. `ack` fires once the
    /// write has been attempted (success or not) so a document switch can
    /// order its reload after the outgoing flush.
    Flush {
        channel_id: String,
        pdf_id: String,
        annotations: Vec<Annotation>,
        ack: Option<oneshot::Sender<()>>,
    },
    DeletePage {
        channel_id: String,
        pdf_id: String,
        page: u32,
    },
    DeleteById {
        id: String,
    },
}

/// The in-memory state for one channel.
#[derive(Debug)]
pub struct Room {
    pub channel_id: String,
    /// `None` means no document open (library view).
    pub current_pdf_id: Option<String>,
    pub current_page: u32,
    pub draw_ops: Vec<DrawOp>,
    pub text_ops: Vec<TextOp>,
    pub sticky_ops: Vec<StickyOp>,
    per_page_target: usize,
    writer: mpsc::UnboundedSender<WriteJob>,
}

impl Room {
    pub fn new(
        channel_id: impl Into<String>,
        per_page_target: usize,
        writer: mpsc::UnboundedSender<WriteJob>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            current_pdf_id: None,
            current_page: 1,
            draw_ops: Vec::new(),
            text_ops: Vec::new(),
            sticky_ops: Vec::new(),
            per_page_target,
            writer,
        }
    }

    pub fn annotation_count(&self) -> usize {
        self.draw_ops.len() + self.text_ops.len() + self.sticky_ops.len()
    }

    pub fn has_working_set(&self) -> bool {
        self.annotation_count() > 0
    }

    /// The full working set as envelope values, concatenated draw/text/sticky.
    pub fn working_set(&self) -> Vec<Annotation> {
        let mut all = Vec::with_capacity(self.annotation_count());
        all.extend(self.draw_ops.iter().cloned().map(Annotation::Draw));
        all.extend(self.text_ops.iter().cloned().map(Annotation::Text));
        all.extend(self.sticky_ops.iter().cloned().map(Annotation::Sticky));
        all
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            channel_id: self.channel_id.clone(),
            current_pdf_id: self.current_pdf_id.clone(),
            current_page: self.current_page,
            draw_ops: self.draw_ops.clone(),
            text_ops: self.text_ops.clone(),
            sticky_ops: self.sticky_ops.clone(),
        }
    }

    /// Page change is pure metadata, no annotation side effects. Returns
    /// `false` (no-op) when no document is open.
    pub fn set_page(&mut self, page: u32) -> bool {
        if self.current_pdf_id.is_none() {
            return false;
        }
        self.current_page = page;
        true
    }

    /// Append a committed stroke. Strokes are append-only: re-sent ids are
    /// not merged in memory (the store upsert keeps the row idempotent).
    pub fn add_draw(&mut self, op: DrawOp) {
        self.draw_ops.push(op.clone());
        self.write_through(Annotation::Draw(op));
        self.evict_if_needed();
    }

    /// Insert or replace a text note by id.
    pub fn upsert_text(&mut self, op: TextOp) {
        match self.text_ops.iter_mut().find(|existing| existing.id == op.id) {
            Some(existing) => *existing = op.clone(),
            None => self.text_ops.push(op.clone()),
        }
        self.write_through(Annotation::Text(op));
        self.evict_if_needed();
    }

    /// Insert or replace a sticky note by id.
    pub fn upsert_sticky(&mut self, op: StickyOp) {
        match self
            .sticky_ops
            .iter_mut()
            .find(|existing| existing.id == op.id)
        {
            Some(existing) => *existing = op.clone(),
            None => self.sticky_ops.push(op.clone()),
        }
        self.write_through(Annotation::Sticky(op));
        self.evict_if_needed();
    }

    /// Remove every annotation on `page` from memory and the store, scoped
    /// to the active document.
    pub fn clear_page(&mut self, page: u32) {
        self.draw_ops.retain(|op| op.page != page);
        self.text_ops.retain(|op| op.page != page);
        self.sticky_ops.retain(|op| op.page != page);

        if let Some(pdf_id) = &self.current_pdf_id {
            self.enqueue(WriteJob::DeletePage {
                channel_id: self.channel_id.clone(),
                pdf_id: pdf_id.clone(),
                page,
            });
        }
    }

    /// Remove one annotation by id: from the store unconditionally (the id
    /// may belong to a page or document no longer active in memory) and
    /// from memory if present.
    pub fn delete_annotation(&mut self, id: &str) {
        self.draw_ops.retain(|op| op.id != id);
        self.text_ops.retain(|op| op.id != id);
        self.sticky_ops.retain(|op| op.id != id);
        self.enqueue(WriteJob::DeleteById { id: id.to_string() });
    }

    /// Queue a bulk flush of the current working set.
    pub fn queue_flush(&self, ack: Option<oneshot::Sender<()>>) {
        let Some(pdf_id) = &self.current_pdf_id else {
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
            return;
        };
        self.enqueue(WriteJob::Flush {
            channel_id: self.channel_id.clone(),
            pdf_id: pdf_id.clone(),
            annotations: self.working_set(),
            ack,
        });
    }

    /// Replace the working set with freshly loaded collections.
    pub fn install(&mut self, pdf_id: Option<String>, loaded: LoadedAnnotations) {
        self.current_pdf_id = pdf_id;
        self.current_page = 1;
        self.draw_ops = loaded.draw_ops;
        self.text_ops = loaded.text_ops;
        self.sticky_ops = loaded.sticky_ops;
    }

    fn write_through(&self, annotation: Annotation) {
        let Some(pdf_id) = &self.current_pdf_id else {
            return;
        };
        self.enqueue(WriteJob::Upsert {
            channel_id: self.channel_id.clone(),
            pdf_id: pdf_id.clone(),
            annotation,
        });
    }

    fn enqueue(&self, job: WriteJob) {
        if self.writer.send(job).is_err() {
            tracing::error!(
                "[Rooms] Writer task for channel {} is gone, dropping persistence job",
                self.channel_id
            );
        }
    }

    /// Memory-only eviction; the store keeps everything.
    ///
    /// When the total in-memory count exceeds 10x the per-page target, the
    /// room is trimmed to its 5x most recently created annotations, by `ts`
    /// descending across all three kinds combined. Ties on `ts` are kept
    /// stable in insertion order. Clients are not told; the next document
    /// switch reloads the full set from the store.
    fn evict_if_needed(&mut self) {
        let total = self.annotation_count();
        let high_water = self.per_page_target * 10;
        if total <= high_water {
            return;
        }

        tracing::warn!(
            "[Rooms] Room {} has too many annotations in memory ({}), trimming",
            self.channel_id,
            total
        );

        let keep_count = self.per_page_target * 5;

        // Index the combined set in insertion order, then stable-sort newest
        // first so equal timestamps preserve their relative order.
        let mut entries: Vec<(i64, AnnotationKind, usize)> =
            Vec::with_capacity(total);
        entries.extend(
            self.draw_ops
                .iter()
                .enumerate()
                .map(|(i, op)| (op.ts, AnnotationKind::Draw, i)),
        );
        entries.extend(
            self.text_ops
                .iter()
                .enumerate()
                .map(|(i, op)| (op.ts, AnnotationKind::Text, i)),
        );
        entries.extend(
            self.sticky_ops
                .iter()
                .enumerate()
                .map(|(i, op)| (op.ts, AnnotationKind::Sticky, i)),
        );
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.truncate(keep_count);

        let mut keep_draw = vec![false; self.draw_ops.len()];
        let mut keep_text = vec![false; self.text_ops.len()];
        let mut keep_sticky = vec![false; self.sticky_ops.len()];
        for (_, kind, index) in entries {
            match kind {
                AnnotationKind::Draw => keep_draw[index] = true,
                AnnotationKind::Text => keep_text[index] = true,
                AnnotationKind::Sticky => keep_sticky[index] = true,
            }
        }

        let mut i = 0;
        self.draw_ops.retain(|_| {
            let keep = keep_draw[i];
            i += 1;
            keep
        });
        let mut i = 0;
        self.text_ops.retain(|_| {
            let keep = keep_text[i];
            i += 1;
            keep
        });
        let mut i = 0;
        self.sticky_ops.retain(|_| {
            let keep = keep_sticky[i];
            i += 1;
            keep
        });

        tracing::info!(
            "[Rooms] Kept {} recent annotations in memory for room {}",
            self.annotation_count(),
            self.channel_id
        );
    }
}

/// Owns every room and the store handle. Constructor-injected so tests can
/// instantiate isolated instances; there is no module-level singleton.
#[derive(Debug)]
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    store: AnnotationStore,
    per_page_target: usize,
}

impl RoomManager {
    pub fn new(store: AnnotationStore, per_page_target: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            per_page_target,
        }
    }

    /// Get (lazily creating) the room for a channel.
    pub async fn get(&self, channel_id: &str) -> Arc<Mutex<Room>> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(channel_id) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(channel_id.to_string()).or_insert_with(|| {
            let writer = spawn_writer(self.store.clone());
            Arc::new(Mutex::new(Room::new(
                channel_id,
                self.per_page_target,
                writer,
            )))
        }))
    }

    /// Current snapshot of a channel's room (creating it if needed).
    pub async fn snapshot(&self, channel_id: &str) -> RoomSnapshot {
        let room = self.get(channel_id).await;
        let room = room.lock().await;
        room.snapshot()
    }

    /// Switch the room's document.
    ///
    /// Flushes the outgoing working set through the room's write queue and
    /// waits for the flush to be attempted before loading the incoming
    /// document, so the reload can never race the flush. The flush itself is
    /// best-effort: failures are logged by the writer and do not block the
    /// switch. Resets the page to 1 regardless of direction.
    pub async fn set_pdf(&self, room: &mut Room, pdf_id: Option<String>) -> RoomSnapshot {
        if room.current_pdf_id.is_some() && room.has_working_set() {
            tracing::info!(
                "[Rooms] Saving {} annotations for PDF {:?} in channel {}",
                room.annotation_count(),
                room.current_pdf_id,
                room.channel_id
            );
            let (ack_tx, ack_rx) = oneshot::channel();
            room.queue_flush(Some(ack_tx));
            if ack_rx.await.is_err() {
                tracing::error!(
                    "[Rooms] Flush writer for channel {} went away during document switch",
                    room.channel_id
                );
            }
        }

        let loaded = match &pdf_id {
            Some(pdf) => match self.store.load_all(&room.channel_id, pdf).await {
                Ok(loaded) => {
                    tracing::info!(
                        "[Rooms] Loaded {} annotations for PDF {} in channel {}",
                        loaded.len(),
                        pdf,
                        room.channel_id
                    );
                    loaded
                }
                Err(e) => {
                    // Availability over durability: open the document with an
                    // empty working set rather than failing the switch.
                    tracing::error!(
                        "[Rooms] Failed to load annotations for PDF {}: {}",
                        pdf,
                        e
                    );
                    Default::default()
                }
            },
            None => Default::default(),
        };

        room.install(pdf_id, loaded);
        room.snapshot()
    }

    /// Periodic sweep: flush every room with a non-empty working set.
    /// Defends against a crash between write-through operations.
    pub async fn flush_all(&self) {
        let rooms: Vec<Arc<Mutex<Room>>> = {
            let rooms = self.rooms.read().await;
            rooms.values().cloned().collect()
        };
        let mut flushed = 0usize;
        for room in rooms {
            let room = room.lock().await;
            if room.current_pdf_id.is_some() && room.has_working_set() {
                room.queue_flush(None);
                flushed += 1;
            }
        }
        if flushed > 0 {
            tracing::debug!("[Rooms] Queued periodic flush for {} room(s)", flushed);
        }
    }

    /// Shutdown flush: queue a flush for every room with a non-empty
    /// working set and wait until each has been attempted, so a clean
    /// shutdown loses nothing.
    pub async fn flush_all_and_wait(&self) {
        let rooms: Vec<Arc<Mutex<Room>>> = {
            let rooms = self.rooms.read().await;
            rooms.values().cloned().collect()
        };
        let mut acks = Vec::new();
        for room in rooms {
            let room = room.lock().await;
            if room.current_pdf_id.is_some() && room.has_working_set() {
                let (ack_tx, ack_rx) = oneshot::channel();
                room.queue_flush(Some(ack_tx));
                acks.push(ack_rx);
            }
        }
        let count = acks.len();
        for ack in acks {
            let _ = ack.await;
        }
        if count > 0 {
            tracing::info!("[Rooms] Final flush completed for {} room(s)", count);
        }
    }

    /// A document was permanently removed from the library: purge its
    /// annotations across every channel and force any room currently
    /// viewing it back to the library view. Returns the affected channels
    /// so the caller can broadcast fresh snapshots.
    pub async fn pdf_deleted(&self, pdf_id: &str) -> Result<Vec<String>, BackendError> {
        self.store.delete_pdf_everywhere(pdf_id).await?;

        let rooms: Vec<Arc<Mutex<Room>>> = {
            let rooms = self.rooms.read().await;
            rooms.values().cloned().collect()
        };

        let mut affected = Vec::new();
        for room in rooms {
            let mut room = room.lock().await;
            if room.current_pdf_id.as_deref() == Some(pdf_id) {
                room.install(None, Default::default());
                affected.push(room.channel_id.clone());
            }
        }
        Ok(affected)
    }
}

/// Spawn the single writer task for one room. Storage failures are logged
/// and never crash the room; the periodic flush sweep retries the state.
fn spawn_writer(store: AnnotationStore) -> mpsc::UnboundedSender<WriteJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Upsert {
                    channel_id,
                    pdf_id,
                    annotation,
                } => {
                    if let Err(e) = store.upsert(&channel_id, &pdf_id, &annotation).await {
                        tracing::error!(
                            "[Rooms] Write-through failed for annotation '{}': {}",
                            annotation.id(),
                            e
                        );
                    }
                }
                WriteJob::Flush {
                    channel_id,
                    pdf_id,
                    annotations,
                    ack,
                } => {
                    if let Err(e) = store.upsert_batch(&channel_id, &pdf_id, &annotations).await {
                        tracing::error!(
                            "[Rooms] Flush of {} annotations for PDF {} failed: {}",
                            annotations.len(),
                            pdf_id,
                            e
                        );
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                WriteJob::DeletePage {
                    channel_id,
                    pdf_id,
                    page,
                } => {
                    if let Err(e) = store.delete_page(&channel_id, &pdf_id, page).await {
                        tracing::error!("[Rooms] Page delete failed for page {}: {}", page, e);
                    }
                }
                WriteJob::DeleteById { id } => {
                    if let Err(e) = store.delete_by_id(&id).await {
                        tracing::error!("[Rooms] Delete failed for annotation '{}': {}", id, e);
                    }
                }
            }
        }
    });
    tx
}
