//! Store lifecycle state machine.
//!
//! Pure transitions only: the store feeds events in and executes the
//! returned actions. Nothing here touches the cache or the runtime.

/// Lifecycle of one message store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreLifecycle {
    /// Created, no load requested yet.
    #[default]
    Uninitialized,
    /// First (or reload) page is being fetched.
    Initializing,
    /// Loaded; changes apply directly.
    Ready,
    /// Cancellation signalled, background work draining.
    TearingDown,
    /// Nothing further happens.
    Disposed,
}

/// Inputs to [`StoreLifecycle::on_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `initialize` was called.
    InitializeRequested,
    /// Initial page published and pending changes replayed.
    InitializeCompleted,
    /// A reload change arrived or the caller jumped to the latest page.
    ReloadRequested,
    /// The conversation view closed.
    TeardownRequested,
    /// Background work has stopped.
    TeardownCompleted,
}

/// Side effects the store must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// Queue an initialize run on the serial worker.
    ScheduleInitialize,
    /// Drop cached rows, frontiers and pseudo-record flags.
    ResetCache,
    /// Signal cancellation to every suspension point.
    CancelBackgroundWork,
    /// Throw away changes queued before initialization finished.
    DiscardPending,
}

/// What to do with an incoming change event in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDisposition {
    /// Hold it until initialization completes.
    Enqueue,
    /// Apply it now under the structural lock.
    Apply,
    /// Ignore it.
    Drop,
}

impl StoreLifecycle {
    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: LifecycleEvent) -> (Self, Vec<StoreAction>) {
        use LifecycleEvent as E;
        match (self, event) {
            (Self::Uninitialized, E::InitializeRequested) => {
                (Self::Initializing, vec![StoreAction::ScheduleInitialize])
            }
            (Self::Initializing, E::InitializeCompleted) => (Self::Ready, vec![]),
            (Self::Ready | Self::Initializing, E::ReloadRequested) => (
                Self::Initializing,
                vec![StoreAction::ResetCache, StoreAction::ScheduleInitialize],
            ),
            (Self::Uninitialized | Self::Initializing | Self::Ready, E::TeardownRequested) => (
                Self::TearingDown,
                vec![StoreAction::CancelBackgroundWork, StoreAction::DiscardPending],
            ),
            (Self::TearingDown, E::TeardownCompleted) => (Self::Disposed, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// How a change event arriving now is handled.
    pub fn change_disposition(&self) -> ChangeDisposition {
        match self {
            Self::Uninitialized | Self::Initializing => ChangeDisposition::Enqueue,
            Self::Ready => ChangeDisposition::Apply,
            Self::TearingDown | Self::Disposed => ChangeDisposition::Drop,
        }
    }

    /// Teardown has started or finished.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::TearingDown | Self::Disposed)
    }

    /// Initialization completed and no teardown started.
    pub fn is_ready(&self) -> bool {
        *self == Self::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        assert_eq!(StoreLifecycle::default(), StoreLifecycle::Uninitialized);
    }

    #[test]
    fn happy_path() {
        let (s, actions) = StoreLifecycle::Uninitialized.on_event(LifecycleEvent::InitializeRequested);
        assert_eq!(s, StoreLifecycle::Initializing);
        assert_eq!(actions, vec![StoreAction::ScheduleInitialize]);

        let (s, actions) = s.on_event(LifecycleEvent::InitializeCompleted);
        assert_eq!(s, StoreLifecycle::Ready);
        assert!(actions.is_empty());

        let (s, actions) = s.on_event(LifecycleEvent::TeardownRequested);
        assert_eq!(s, StoreLifecycle::TearingDown);
        assert!(actions.contains(&StoreAction::CancelBackgroundWork));

        let (s, _) = s.on_event(LifecycleEvent::TeardownCompleted);
        assert_eq!(s, StoreLifecycle::Disposed);
    }

    #[test]
    fn reload_goes_back_to_initializing() {
        let (s, actions) = StoreLifecycle::Ready.on_event(LifecycleEvent::ReloadRequested);
        assert_eq!(s, StoreLifecycle::Initializing);
        assert_eq!(actions, vec![StoreAction::ResetCache, StoreAction::ScheduleInitialize]);
    }

    #[test]
    fn disposed_ignores_everything() {
        for event in [
            LifecycleEvent::InitializeRequested,
            LifecycleEvent::ReloadRequested,
            LifecycleEvent::TeardownRequested,
        ] {
            let (s, actions) = StoreLifecycle::Disposed.on_event(event);
            assert_eq!(s, StoreLifecycle::Disposed);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn second_initialize_is_ignored() {
        let (s, actions) = StoreLifecycle::Ready.on_event(LifecycleEvent::InitializeRequested);
        assert_eq!(s, StoreLifecycle::Ready);
        assert!(actions.is_empty());
    }

    #[test]
    fn dispositions_follow_state() {
        assert_eq!(StoreLifecycle::Uninitialized.change_disposition(), ChangeDisposition::Enqueue);
        assert_eq!(StoreLifecycle::Initializing.change_disposition(), ChangeDisposition::Enqueue);
        assert_eq!(StoreLifecycle::Ready.change_disposition(), ChangeDisposition::Apply);
        assert_eq!(StoreLifecycle::TearingDown.change_disposition(), ChangeDisposition::Drop);
        assert_eq!(StoreLifecycle::Disposed.change_disposition(), ChangeDisposition::Drop);
    }
}
