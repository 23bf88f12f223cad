//! Concurrent, paginated message store for one conversation.
//!
//! A [`MessageStore`] owns the date-bucketed cache of one open conversation
//! and keeps it in step with three inputs:
//!
//! - the initial load and pagination requests, run one at a time on a
//!   background worker against the [`MessageLog`]
//! - change events from the [`ChangeBus`], applied by an event pump in
//!   publication order
//! - direct calls from the display layer (`apply_change`, `remove_record`,
//!   `jump_to_latest`)
//!
//! Every structural mutation runs under one async lock. Waiting for that lock
//! is raced against the store's cancellation token, so [`MessageStore::teardown`]
//! wakes every waiter and no mutation is published afterwards.
//!
//! Events that arrive before the first load completes are queued and replayed
//! in arrival order before the store reports itself ready.
//!
//! Observers follow what happened through [`StoreNotice`]s.

use crate::anchors::ScrollAnchors;
use crate::bus::{ChangeBus, Subscription};
use crate::connectivity::ClientContext;
use crate::delivery::ReadAcknowledger;
use crate::message_log::MessageLog;
use chat_core::{
    choose_initial_anchor, ChangeDisposition, DateKey, Direction, Frontiers, InFlight, InitialAnchor,
    LifecycleEvent, MessageCache, MessageViewModel, PageRequest, PendingChangeQueue, RemoveOutcome,
    RowIndex, StoreAction, StoreLifecycle, StyleContext,
};
use chat_types::{
    ChangeEvent, ConversationId, ConversationKind, ConversationMeta, MessageCategory, MessageId,
    MessageRecord, MessageStatus, UserId,
};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NOTICE_CAPACITY: usize = 256;

/// Search target the conversation was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    /// Search keyword to emphasize.
    pub keyword: String,
    /// Message to open at.
    pub message_id: MessageId,
}

impl Highlight {
    /// Highlight `message_id` for `keyword`.
    pub fn new(keyword: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            keyword: keyword.into(),
            message_id,
        }
    }
}

/// Where the display layer should scroll after a (re)load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialPosition {
    /// Scroll to a row, `offset` pixels from the top of the viewport.
    Row {
        /// Target row.
        index: RowIndex,
        /// Pixel offset of the row.
        offset: f64,
    },
    /// Scroll to the newest row.
    Bottom,
}

/// Notification sent to observers after the store published a change.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreNotice {
    /// The whole cache was rebuilt.
    Reloaded {
        /// Where to scroll.
        initial_position: InitialPosition,
    },
    /// Older rows were merged at the top.
    PagePrepended {
        /// Buckets created.
        sections: usize,
        /// Rows added, pseudo rows included.
        rows: usize,
    },
    /// Newer rows were merged at the bottom.
    PageAppended {
        /// Buckets created.
        sections: usize,
        /// Rows added, pseudo rows included.
        rows: usize,
    },
    /// A single row was inserted.
    RowInserted {
        /// Where it landed.
        index: RowIndex,
        /// Whether its bucket is new.
        new_section: bool,
    },
    /// A row's record changed in place.
    RowUpdated {
        /// Updated row.
        index: RowIndex,
    },
    /// A row was removed.
    RowRemoved {
        /// Former address of the row.
        index: RowIndex,
        /// Its bucket was removed too.
        section_removed: bool,
    },
    /// Messages exist that are not loaded at the bottom of the cache.
    MessagesOutsideVisibleBounds {
        /// How many.
        count: u64,
    },
    /// The user's own message arrived while the newest page is not loaded.
    /// The display layer should call [`MessageStore::jump_to_latest`].
    OwnMessageOutsideVisibleBounds {
        /// The message that was not inserted.
        id: MessageId,
    },
    /// Conversation metadata changed.
    ConversationUpdated,
}

/// Result of an initial load or a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The cache was built from `fetched` persisted records.
    Ready {
        /// Records returned by the log.
        fetched: usize,
    },
    /// The store was not in a state that accepts the request.
    Skipped,
    /// The store was torn down first.
    Cancelled,
}

/// Result of a pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Not ready, frontier reached, a load is in flight, or nothing to page from.
    Skipped,
    /// A page was merged.
    Loaded {
        /// Records returned by the log.
        fetched: usize,
        /// Records that were new to the cache.
        inserted: usize,
    },
    /// The message log failed; the cache is unchanged.
    Unavailable,
    /// The store was torn down first.
    Cancelled,
}

/// Collaborators a store is opened with.
#[derive(Clone)]
pub struct StoreDeps {
    /// Persisted messages.
    pub log: Arc<dyn MessageLog>,
    /// Change events source.
    pub bus: ChangeBus,
    /// Shared scroll positions.
    pub anchors: ScrollAnchors,
    /// Read receipts for messages shown to the user.
    pub acknowledger: Arc<dyn ReadAcknowledger>,
}

enum InitTarget {
    Resume(Option<MessageId>),
    Latest,
}

enum WorkItem {
    Initialize {
        target: InitTarget,
        reply: Option<oneshot::Sender<InitOutcome>>,
    },
    LoadMore {
        direction: Direction,
        reply: oneshot::Sender<LoadOutcome>,
    },
}

enum Replay {
    Completed,
    ReloadRequested,
    Cancelled,
}

struct InitialLoad {
    fetched: usize,
    anchor: InitialAnchor,
}

struct StoreState {
    lifecycle: StoreLifecycle,
    meta: ConversationMeta,
    cache: MessageCache,
    frontiers: Frontiers,
    in_flight: InFlight,
    pending: PendingChangeQueue,
    highlight: Option<Highlight>,
    first_unread: Option<MessageId>,
    divider_inserted: bool,
    hint_inserted: bool,
    initial_position: Option<InitialPosition>,
}

impl StoreState {
    fn transition(&mut self, event: LifecycleEvent) -> Vec<StoreAction> {
        let (next, actions) = self.lifecycle.on_event(event);
        if next != self.lifecycle {
            tracing::debug!("Store lifecycle {:?} -> {:?}", self.lifecycle, next);
        }
        self.lifecycle = next;
        actions
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.frontiers.reset();
        self.highlight = None;
        self.first_unread = None;
        self.divider_inserted = false;
        self.hint_inserted = false;
        self.initial_position = None;
    }
}

struct StoreInner {
    conversation_id: ConversationId,
    ctx: ClientContext,
    log: Arc<dyn MessageLog>,
    anchors: ScrollAnchors,
    acknowledger: Arc<dyn ReadAcknowledger>,
    structural: tokio::sync::Mutex<()>,
    state: Mutex<StoreState>,
    cancel: CancellationToken,
    notices: broadcast::Sender<StoreNotice>,
    work_tx: mpsc::UnboundedSender<WorkItem>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn style_context(meta: &ConversationMeta, me: &UserId) -> StyleContext {
    match meta.kind {
        ConversationKind::Group => StyleContext::group(me.clone()),
        ConversationKind::Contact => StyleContext {
            kind: ConversationKind::Contact,
            me: me.clone(),
            owner: meta.owner_id.clone(),
        },
    }
}

fn should_acknowledge(record: &MessageRecord, me: &UserId) -> bool {
    !record.is_pseudo() && record.author_id != *me && record.status == MessageStatus::Delivered
}

/// Handle to one conversation's message store.
///
/// Clones share the same store. The background tasks stop when the store is
/// torn down or the last handle is dropped.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<StoreInner>,
}

impl MessageStore {
    /// Open a store for `meta` and start listening for its change events.
    ///
    /// Nothing is loaded until [`MessageStore::initialize`]; events received
    /// before then are queued. Must be called inside a Tokio runtime.
    pub fn open(
        ctx: ClientContext,
        meta: ConversationMeta,
        deps: StoreDeps,
        highlight: Option<Highlight>,
    ) -> Self {
        let conversation_id = meta.conversation_id.clone();
        let cache = MessageCache::new(ctx.config.store.offset(), style_context(&meta, &ctx.me));
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let cancel = CancellationToken::new();
        let subscription = deps.bus.subscribe(conversation_id.clone());

        let state = StoreState {
            lifecycle: StoreLifecycle::default(),
            meta,
            cache,
            frontiers: Frontiers::default(),
            in_flight: InFlight::default(),
            pending: PendingChangeQueue::new(),
            highlight,
            first_unread: None,
            divider_inserted: false,
            hint_inserted: false,
            initial_position: None,
        };
        let inner = Arc::new(StoreInner {
            conversation_id: conversation_id.clone(),
            ctx,
            log: deps.log,
            anchors: deps.anchors,
            acknowledger: deps.acknowledger,
            structural: tokio::sync::Mutex::new(()),
            state: Mutex::new(state),
            cancel: cancel.clone(),
            notices,
            work_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let worker = tokio::spawn(run_worker(Arc::downgrade(&inner), work_rx, cancel.clone()));
        let pump = tokio::spawn(run_event_pump(Arc::downgrade(&inner), subscription, cancel));
        inner.tasks().extend([worker, pump]);

        tracing::debug!("Opened message store for conversation {}", conversation_id);
        Self { inner }
    }

    /// Load the first page and replay queued events.
    ///
    /// The page is centred on, in priority order: `anchor`, the highlight
    /// target, the stored scroll anchor, the first unread message; otherwise
    /// it is the newest page. Returns [`InitOutcome::Skipped`] unless the
    /// store is uninitialized.
    pub async fn initialize(&self, anchor: Option<MessageId>) -> InitOutcome {
        let actions = self.inner.state().transition(LifecycleEvent::InitializeRequested);
        if !actions.contains(&StoreAction::ScheduleInitialize) {
            return InitOutcome::Skipped;
        }
        let (tx, rx) = oneshot::channel();
        self.inner.schedule_initialize(InitTarget::Resume(anchor), Some(tx));
        rx.await.unwrap_or(InitOutcome::Cancelled)
    }

    /// Load one page beyond the oldest (`Above`) or newest (`Below`) loaded record.
    ///
    /// At most one load per direction is in flight; extra requests return
    /// [`LoadOutcome::Skipped`] without touching the log.
    pub async fn load_more(&self, direction: Direction) -> LoadOutcome {
        {
            let mut state = self.inner.state();
            if !state.lifecycle.is_ready() || state.frontiers.reached(direction) {
                return LoadOutcome::Skipped;
            }
            if !state.in_flight.try_begin(direction) {
                tracing::trace!("Load {:?} already in flight", direction);
                return LoadOutcome::Skipped;
            }
        }
        let (tx, rx) = oneshot::channel();
        let item = WorkItem::LoadMore { direction, reply: tx };
        if self.inner.work_tx.send(item).is_err() {
            self.inner.state().in_flight.finish(direction);
            return LoadOutcome::Cancelled;
        }
        rx.await.unwrap_or(LoadOutcome::Cancelled)
    }

    /// Apply one change event.
    ///
    /// Queued while the store is still loading, dropped once it is shutting
    /// down. Events from the bus go through here as well.
    pub async fn apply_change(&self, event: ChangeEvent) {
        self.inner.apply_change(event).await;
    }

    /// Remove the row at `section`/`row`.
    pub async fn remove_record(&self, section: usize, row: usize) -> RemoveOutcome {
        let inner = &self.inner;
        let Some(_guard) = inner.lock_structure().await else {
            return RemoveOutcome::default();
        };
        let outcome = {
            let mut state = inner.state();
            if !state.lifecycle.is_ready() {
                return RemoveOutcome::default();
            }
            state.cache.remove(section, row)
        };
        if outcome.row_removed {
            inner.notify(StoreNotice::RowRemoved {
                index: RowIndex::new(section, row),
                section_removed: outcome.section_removed,
            });
        }
        outcome
    }

    /// Discard the cache and reload the newest page.
    pub async fn jump_to_latest(&self) -> InitOutcome {
        let inner = &self.inner;
        let rx = {
            let Some(_guard) = inner.lock_structure().await else {
                return InitOutcome::Cancelled;
            };
            if !inner.state().lifecycle.is_ready() {
                return InitOutcome::Skipped;
            }
            let (tx, rx) = oneshot::channel();
            inner.begin_reload(InitTarget::Latest, Some(tx));
            rx
        };
        rx.await.unwrap_or(InitOutcome::Cancelled)
    }

    /// Stop background work, drop queued events and wait for the tasks to exit.
    ///
    /// Blocked waiters on the structural lock are woken and publish nothing.
    pub async fn teardown(&self) {
        let inner = &self.inner;
        let actions = inner.state().transition(LifecycleEvent::TeardownRequested);
        if actions.is_empty() {
            return;
        }
        for action in actions {
            match action {
                StoreAction::CancelBackgroundWork => inner.cancel.cancel(),
                StoreAction::DiscardPending => inner.state().pending.clear(),
                StoreAction::ResetCache | StoreAction::ScheduleInitialize => {}
            }
        }
        let tasks = std::mem::take(&mut *inner.tasks());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Store task for {} ended abnormally: {}", inner.conversation_id, e);
            }
        }
        inner.state().transition(LifecycleEvent::TeardownCompleted);
        tracing::info!("Closed message store for conversation {}", inner.conversation_id);
    }

    /// Receive notices for every change published from now on.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<StoreNotice> {
        self.inner.notices.subscribe()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Conversation this store holds.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.inner.conversation_id
    }

    /// Current conversation metadata.
    pub fn meta(&self) -> ConversationMeta {
        self.inner.state().meta.clone()
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> StoreLifecycle {
        self.inner.state().lifecycle
    }

    /// History exhaustion flags.
    pub fn frontiers(&self) -> Frontiers {
        self.inner.state().frontiers
    }

    /// Whether a load in `direction` is in flight.
    pub fn is_loading(&self, direction: Direction) -> bool {
        self.inner.state().in_flight.is_loading(direction)
    }

    /// Active highlight, cleared once newer pages are loaded.
    pub fn highlight(&self) -> Option<Highlight> {
        self.inner.state().highlight.clone()
    }

    /// Scroll target computed by the last (re)load.
    pub fn initial_position(&self) -> Option<InitialPosition> {
        self.inner.state().initial_position
    }

    /// Number of date buckets.
    pub fn section_count(&self) -> usize {
        self.inner.state().cache.section_count()
    }

    /// Rows in `section`, 0 when out of range.
    pub fn row_count(&self, section: usize) -> usize {
        self.inner.state().cache.row_count(section)
    }

    /// Total rows, pseudo rows included.
    pub fn len(&self) -> usize {
        self.inner.state().cache.len()
    }

    /// No rows loaded.
    pub fn is_empty(&self) -> bool {
        self.inner.state().cache.is_empty()
    }

    /// Date key of `section`.
    pub fn section_key(&self, section: usize) -> Option<DateKey> {
        self.inner.state().cache.section_key(section)
    }

    /// Snapshot of the rows of `section`; empty when out of range.
    pub fn query(&self, section: usize) -> Vec<MessageViewModel> {
        self.inner
            .state()
            .cache
            .section(section)
            .map(<[MessageViewModel]>::to_vec)
            .unwrap_or_default()
    }

    /// Row at an address.
    pub fn view_model_at(&self, section: usize, row: usize) -> Option<MessageViewModel> {
        self.inner.state().cache.view_model_at(section, row).cloned()
    }

    /// Record at an address.
    pub fn record_at(&self, section: usize, row: usize) -> Option<MessageRecord> {
        self.inner.state().cache.record_at(section, row).cloned()
    }

    /// First row whose record satisfies `predicate`.
    pub fn locate<F>(&self, predicate: F) -> Option<RowIndex>
    where
        F: FnMut(&MessageRecord) -> bool,
    {
        self.inner.state().cache.locate(predicate)
    }

    /// Address of the row holding `id`.
    pub fn position_of(&self, id: &MessageId) -> Option<RowIndex> {
        self.inner.state().cache.position_of(id)
    }

    /// Whether `id` is loaded.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.inner.state().cache.contains(id)
    }

    /// Every loaded record in display order.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.inner.state().cache.iter().map(|vm| vm.record.clone()).collect()
    }

    /// Bucket and id-set invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.inner.state().cache.is_consistent()
    }
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: StoreNotice) {
        // No observers is fine.
        let _ = self.notices.send(notice);
    }

    fn page_size(&self) -> usize {
        self.ctx.config.store.page_size
    }

    /// Wait for the structural lock, or `None` once the store is cancelled.
    async fn lock_structure(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            guard = self.structural.lock() => Some(guard),
        }
    }

    /// Run `fut` unless the store is cancelled first.
    async fn cancellable<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }

    fn schedule_initialize(&self, target: InitTarget, reply: Option<oneshot::Sender<InitOutcome>>) {
        if let Err(mpsc::error::SendError(item)) = self.work_tx.send(WorkItem::Initialize { target, reply }) {
            if let WorkItem::Initialize { reply: Some(reply), .. } = item {
                let _ = reply.send(InitOutcome::Cancelled);
            }
        }
    }

    /// Reset the store and schedule a fresh load. Caller holds the structural lock.
    fn begin_reload(&self, target: InitTarget, reply: Option<oneshot::Sender<InitOutcome>>) {
        let actions = {
            let mut state = self.state();
            let actions = state.transition(LifecycleEvent::ReloadRequested);
            if actions.contains(&StoreAction::ResetCache) {
                state.reset();
                self.anchors.remove(&self.conversation_id);
            }
            actions
        };
        if actions.contains(&StoreAction::ScheduleInitialize) {
            tracing::debug!("Reloading conversation {}", self.conversation_id);
            self.schedule_initialize(target, reply);
        } else if let Some(reply) = reply {
            let _ = reply.send(InitOutcome::Skipped);
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    async fn run_initialize(&self, mut target: InitTarget) -> InitOutcome {
        let Some(_guard) = self.lock_structure().await else {
            return InitOutcome::Cancelled;
        };
        let load = loop {
            let Some(load) = self.load_initial_page(&target).await else {
                return InitOutcome::Cancelled;
            };
            match self.replay_pending().await {
                Replay::Completed => break load,
                Replay::ReloadRequested => target = InitTarget::Resume(None),
                Replay::Cancelled => return InitOutcome::Cancelled,
            }
        };

        self.acknowledger.acknowledge_conversation(&self.conversation_id);
        if matches!(load.anchor, InitialAnchor::ScrollAnchor(_)) {
            match self.cancellable(self.log.unread_count(&self.conversation_id)).await {
                Some(Ok(count)) if count > 0 => {
                    self.notify(StoreNotice::MessagesOutsideVisibleBounds { count });
                }
                Some(Err(e)) => tracing::warn!("Unread count for {} unavailable: {}", self.conversation_id, e),
                _ => {}
            }
        }
        tracing::info!(
            "Initialized conversation {} from {:?} ({} records)",
            self.conversation_id,
            load.anchor,
            load.fetched
        );
        InitOutcome::Ready { fetched: load.fetched }
    }

    /// Fetch and publish the first page. `None` if cancelled.
    async fn load_initial_page(&self, target: &InitTarget) -> Option<InitialLoad> {
        let conversation = &self.conversation_id;
        let first_unread = match self.cancellable(self.log.first_unread_id(conversation)).await? {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("First unread lookup for {} failed: {}", conversation, e);
                None
            }
        };
        let scroll_anchor = self.anchors.get(conversation);
        let anchor = match target {
            InitTarget::Latest => InitialAnchor::Latest,
            InitTarget::Resume(explicit) => {
                let highlight = self.state().highlight.as_ref().map(|h| h.message_id.clone());
                choose_initial_anchor(
                    explicit.clone(),
                    highlight,
                    scroll_anchor.as_ref().map(|a| a.message_id.clone()),
                    first_unread.clone(),
                )
            }
        };

        let page_size = self.page_size();
        let request = anchor.page_request();
        let (records, failed) = match self.cancellable(self.log.fetch_page(conversation, &request, page_size)).await? {
            Ok(records) => (records, false),
            Err(e) => {
                tracing::warn!("Initial page for {} unavailable: {}", conversation, e);
                (Vec::new(), true)
            }
        };
        if self.cancel.is_cancelled() {
            return None;
        }

        let fetched = records.len();
        let position = {
            let mut state = self.state();
            state.cache.replace_all(records);
            state.frontiers.reset();
            state.divider_inserted = false;
            state.hint_inserted = false;
            if !failed {
                if fetched < page_size {
                    state.frontiers.mark_both();
                }
                if anchor == InitialAnchor::Latest {
                    state.frontiers.mark(Direction::Below);
                }
            }
            state.first_unread = first_unread;
            self.insert_unread_divider(&mut state);
            self.insert_encryption_hint(&mut state);
            let offset = scroll_anchor.map_or(0.0, |a| a.pixel_offset);
            let position = initial_position(&state, &anchor, offset);
            state.initial_position = Some(position);
            position
        };
        self.notify(StoreNotice::Reloaded {
            initial_position: position,
        });
        Some(InitialLoad { fetched, anchor })
    }

    /// Apply queued events in arrival order, then mark the store ready.
    async fn replay_pending(&self) -> Replay {
        loop {
            let batch = {
                let mut state = self.state();
                if state.pending.is_empty() {
                    state.transition(LifecycleEvent::InitializeCompleted);
                    return Replay::Completed;
                }
                state.pending.take_all()
            };
            tracing::debug!("Replaying {} queued changes for {}", batch.len(), self.conversation_id);
            let mut events = batch.into_iter();
            while let Some(event) = events.next() {
                if self.cancel.is_cancelled() {
                    return Replay::Cancelled;
                }
                if event == ChangeEvent::Reload {
                    let mut state = self.state();
                    state.pending.requeue_front(events.collect());
                    state.reset();
                    self.anchors.remove(&self.conversation_id);
                    return Replay::ReloadRequested;
                }
                self.apply_event(event).await;
            }
        }
    }

    fn hint_allowed(&self, meta: &ConversationMeta) -> bool {
        self.ctx.config.store.encryption_hint && !meta.owner_is_bot
    }

    /// Insert the unread divider before the first unread record, once.
    fn insert_unread_divider(&self, state: &mut StoreState) -> Option<RowIndex> {
        if state.divider_inserted || state.highlight.is_some() {
            return None;
        }
        let target = state.first_unread.clone()?;
        let at = state.cache.position_of(&target)?;
        let created_at = state.cache.record_at(at.section, at.row)?.created_at;
        let divider = MessageRecord::unread_divider(self.conversation_id.clone(), created_at);
        let index = state.cache.insert_before(&target, divider)?;
        state.divider_inserted = true;
        Some(index)
    }

    /// Insert the encryption hint at the very top once history is exhausted.
    fn insert_encryption_hint(&self, state: &mut StoreState) -> Option<RowIndex> {
        if state.hint_inserted || !state.frontiers.reached_earliest() || !self.hint_allowed(&state.meta) {
            return None;
        }
        let created_at = state
            .cache
            .edge_record(Direction::Above)
            .map_or_else(chrono::Utc::now, |r| r.created_at);
        let hint = MessageRecord::encryption_hint(self.conversation_id.clone(), created_at);
        let index = state.cache.insert_front(hint)?;
        state.hint_inserted = true;
        Some(index)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    async fn run_load_more(&self, direction: Direction) -> LoadOutcome {
        let outcome = self.load_page(direction).await;
        self.state().in_flight.finish(direction);
        outcome
    }

    async fn load_page(&self, direction: Direction) -> LoadOutcome {
        let edge = {
            let state = self.state();
            if !state.lifecycle.is_ready() || state.frontiers.reached(direction) {
                return LoadOutcome::Skipped;
            }
            state.cache.edge_record(direction).map(|r| r.id.clone())
        };
        let Some(edge) = edge else {
            return LoadOutcome::Skipped;
        };

        let page_size = self.page_size();
        let request = PageRequest::beyond(direction, edge);
        let records = match self.cancellable(self.log.fetch_page(&self.conversation_id, &request, page_size)).await {
            None => return LoadOutcome::Cancelled,
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                tracing::warn!("Page {:?} for {} unavailable: {}", request, self.conversation_id, e);
                return LoadOutcome::Unavailable;
            }
        };

        let Some(_guard) = self.lock_structure().await else {
            return LoadOutcome::Cancelled;
        };
        let fetched = records.len();
        let (notice, inserted) = {
            let mut state = self.state();
            if !state.lifecycle.is_ready() || self.cancel.is_cancelled() {
                return LoadOutcome::Skipped;
            }
            let page_has_first_unread = state
                .first_unread
                .as_ref()
                .is_some_and(|id| records.iter().any(|r| r.id == *id));
            let merge = match direction {
                Direction::Above => state.cache.prepend_page(records),
                Direction::Below => state.cache.append_page(records),
            };
            if merge.duplicates_dropped > 0 {
                tracing::debug!("Dropped {} already loaded records", merge.duplicates_dropped);
            }
            if fetched < page_size {
                state.frontiers.mark(direction);
            }
            let mut rows = merge.rows_added;
            let notice = match direction {
                Direction::Above => {
                    if self.insert_encryption_hint(&mut state).is_some() {
                        rows += 1;
                    }
                    StoreNotice::PagePrepended {
                        sections: merge.sections_added,
                        rows,
                    }
                }
                Direction::Below => {
                    state.highlight = None;
                    if page_has_first_unread && self.insert_unread_divider(&mut state).is_some() {
                        rows += 1;
                    }
                    StoreNotice::PageAppended {
                        sections: merge.sections_added,
                        rows,
                    }
                }
            };
            (notice, merge.rows_added)
        };
        self.notify(notice);
        tracing::debug!(
            "Loaded {} records {:?} in {} ({} new)",
            fetched,
            direction,
            self.conversation_id,
            inserted
        );
        LoadOutcome::Loaded { fetched, inserted }
    }

    // =========================================================================
    // Change events
    // =========================================================================

    /// `true` when the event should be applied now; queues or drops it otherwise.
    fn admit(&self, event: &ChangeEvent) -> bool {
        let mut state = self.state();
        match state.lifecycle.change_disposition() {
            ChangeDisposition::Apply => true,
            ChangeDisposition::Enqueue => {
                tracing::trace!("Queued {} for {}", event.kind(), self.conversation_id);
                state.pending.enqueue(event.clone());
                false
            }
            ChangeDisposition::Drop => false,
        }
    }

    async fn apply_change(&self, event: ChangeEvent) {
        if !self.admit(&event) {
            return;
        }
        let Some(_guard) = self.lock_structure().await else {
            return;
        };
        // A reload may have started while waiting.
        if !self.admit(&event) {
            return;
        }
        if event == ChangeEvent::Reload {
            self.begin_reload(InitTarget::Resume(None), None);
            return;
        }
        self.apply_event(event).await;
    }

    /// Apply a non-reload event. Caller holds the structural lock.
    async fn apply_event(&self, event: ChangeEvent) {
        tracing::trace!("Applying {} to {}", event.kind(), self.conversation_id);
        match event {
            // Callers turn reloads into a fresh initialization.
            ChangeEvent::Reload => {}
            ChangeEvent::ReplaceConversationMeta(meta) => {
                {
                    let mut state = self.state();
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    state.cache.set_context(style_context(&meta, &self.ctx.me));
                    state.meta = meta;
                }
                self.notify(StoreNotice::ConversationUpdated);
            }
            ChangeEvent::UpdateGroupIcon { icon_url } => {
                {
                    let mut state = self.state();
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    state.meta.icon_url = icon_url;
                }
                self.notify(StoreNotice::ConversationUpdated);
            }
            ChangeEvent::AddMessage(record) => self.add_message(record),
            ChangeEvent::UpdateStatus { id, status } => self.update_row(&id, |r| r.status = status),
            ChangeEvent::UpdateMediaStatus { id, status } => {
                self.update_row(&id, |r| r.media_status = Some(status));
            }
            ChangeEvent::UpdateProgress { id, progress } => {
                self.update_row(&id, |r| r.media_progress = Some(progress));
            }
            ChangeEvent::UpdateFullRecord { id } => self.refresh_record(id).await,
        }
    }

    fn add_message(&self, record: MessageRecord) {
        if record.conversation_id != self.conversation_id {
            tracing::warn!("Ignoring message {} for {}", record.id, record.conversation_id);
            return;
        }
        let acknowledge = should_acknowledge(&record, &self.ctx.me);
        let own = record.author_id == self.ctx.me;
        let id = record.id.clone();
        let inserted = {
            let mut state = self.state();
            if self.cancel.is_cancelled() {
                return;
            }
            if state.cache.contains(&id) {
                tracing::trace!("Message {} already loaded", id);
                return;
            }
            if !state.frontiers.reached_latest() {
                None
            } else {
                state.cache.insert(record)
            }
        };
        if acknowledge {
            self.acknowledger.acknowledge_read(&id);
        }
        match inserted {
            Some(outcome) => self.notify(StoreNotice::RowInserted {
                index: outcome.index,
                new_section: outcome.new_section,
            }),
            None if own => self.notify(StoreNotice::OwnMessageOutsideVisibleBounds { id }),
            None => self.notify(StoreNotice::MessagesOutsideVisibleBounds { count: 1 }),
        }
    }

    fn update_row<F>(&self, id: &MessageId, apply: F)
    where
        F: FnOnce(&mut MessageRecord),
    {
        let updated = {
            let mut state = self.state();
            if self.cancel.is_cancelled() {
                return;
            }
            state.cache.update(id, apply)
        };
        if let Some(index) = updated {
            self.notify(StoreNotice::RowUpdated { index });
        }
    }

    async fn refresh_record(&self, id: MessageId) {
        let loaded = self.state().cache.contains(&id);
        if !loaded {
            return;
        }
        let record = match self.cancellable(self.log.fetch_full_record(&id)).await {
            None | Some(Ok(None)) => return,
            Some(Ok(Some(record))) => record,
            Some(Err(e)) => {
                tracing::warn!("Refreshing {} failed: {}", id, e);
                return;
            }
        };
        let acknowledge = should_acknowledge(&record, &self.ctx.me);
        let replaced = {
            let mut state = self.state();
            if self.cancel.is_cancelled() {
                return;
            }
            state.cache.replace_record(record)
        };
        if let Some(index) = replaced {
            self.notify(StoreNotice::RowUpdated { index });
            if acknowledge {
                self.acknowledger.acknowledge_read(&id);
            }
        }
    }
}

/// Scroll target after a (re)load.
fn initial_position(state: &StoreState, anchor: &InitialAnchor, scroll_offset: f64) -> InitialPosition {
    let row = |id: &MessageId, offset: f64| {
        state
            .cache
            .position_of(id)
            .map(|index| InitialPosition::Row { index, offset })
    };
    let targeted = match anchor {
        InitialAnchor::Explicit(id) | InitialAnchor::Highlight(id) => row(id, 0.0),
        InitialAnchor::ScrollAnchor(id) => row(id, scroll_offset),
        InitialAnchor::FirstUnread(_) | InitialAnchor::Latest => None,
    };
    if let Some(position) = targeted {
        return position;
    }
    if state.divider_inserted {
        if let Some(index) = state.cache.locate(|r| r.category == MessageCategory::UnreadDivider) {
            // Keep the hint in view when the divider sits right below it.
            let index = if state.hint_inserted && index == RowIndex::new(0, 1) {
                RowIndex::new(0, 0)
            } else {
                index
            };
            return InitialPosition::Row { index, offset: 0.0 };
        }
    }
    InitialPosition::Bottom
}

async fn run_worker(
    store: Weak<StoreInner>,
    mut work_rx: mpsc::UnboundedReceiver<WorkItem>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = work_rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let Some(store) = store.upgrade() else {
            break;
        };
        match item {
            WorkItem::Initialize { target, reply } => {
                let outcome = store.run_initialize(target).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            WorkItem::LoadMore { direction, reply } => {
                let outcome = store.run_load_more(direction).await;
                let _ = reply.send(outcome);
            }
        }
    }
    tracing::trace!("Store worker stopped");
}

async fn run_event_pump(store: Weak<StoreInner>, mut subscription: Subscription, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = subscription.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(store) = store.upgrade() else {
            break;
        };
        store.apply_change(event).await;
    }
    tracing::trace!("Event pump for {} stopped", subscription.conversation());
}
