//! Pagination bookkeeping: direction, frontiers, in-flight flags and the
//! initial-page priority.

use chat_types::MessageId;

/// Pagination direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards older records.
    Above,
    /// Towards newer records.
    Below,
}

/// Which page to ask the message log for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// The newest page.
    Latest,
    /// Records strictly older than the id.
    Above(MessageId),
    /// Records strictly newer than the id.
    Below(MessageId),
    /// A page centred on the id, including it.
    Around(MessageId),
}

impl PageRequest {
    /// Page beyond `edge` in `direction`.
    pub fn beyond(direction: Direction, edge: MessageId) -> Self {
        match direction {
            Direction::Above => Self::Above(edge),
            Direction::Below => Self::Below(edge),
        }
    }
}

/// History exhaustion flags. Only [`Frontiers::reset`] clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frontiers {
    reached_earliest: bool,
    reached_latest: bool,
}

impl Frontiers {
    /// Oldest record is loaded.
    pub fn reached_earliest(&self) -> bool {
        self.reached_earliest
    }

    /// Newest record is loaded.
    pub fn reached_latest(&self) -> bool {
        self.reached_latest
    }

    /// Frontier in `direction`.
    pub fn reached(&self, direction: Direction) -> bool {
        match direction {
            Direction::Above => self.reached_earliest,
            Direction::Below => self.reached_latest,
        }
    }

    /// Mark the frontier in `direction` as reached.
    pub fn mark(&mut self, direction: Direction) {
        match direction {
            Direction::Above => self.reached_earliest = true,
            Direction::Below => self.reached_latest = true,
        }
    }

    /// Mark both frontiers.
    pub fn mark_both(&mut self) {
        self.reached_earliest = true;
        self.reached_latest = true;
    }

    /// Clear both frontiers (full reload only).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-direction "load in flight" flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InFlight {
    above: bool,
    below: bool,
}

impl InFlight {
    fn slot(&mut self, direction: Direction) -> &mut bool {
        match direction {
            Direction::Above => &mut self.above,
            Direction::Below => &mut self.below,
        }
    }

    /// Claim `direction`. Returns `false` if a load is already running there.
    pub fn try_begin(&mut self, direction: Direction) -> bool {
        let slot = self.slot(direction);
        if *slot {
            return false;
        }
        *slot = true;
        true
    }

    /// Release `direction`.
    pub fn finish(&mut self, direction: Direction) {
        *self.slot(direction) = false;
    }

    /// Whether a load is running in `direction`.
    pub fn is_loading(&self, direction: Direction) -> bool {
        match direction {
            Direction::Above => self.above,
            Direction::Below => self.below,
        }
    }
}

/// Where the initial page is centred, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialAnchor {
    /// Caller-supplied message id.
    Explicit(MessageId),
    /// Search/highlight target.
    Highlight(MessageId),
    /// Last viewed position stored for the conversation.
    ScrollAnchor(MessageId),
    /// First unread message.
    FirstUnread(MessageId),
    /// Nothing to centre on.
    Latest,
}

impl InitialAnchor {
    /// The page request for this anchor.
    pub fn page_request(&self) -> PageRequest {
        match self {
            Self::Explicit(id) | Self::Highlight(id) | Self::ScrollAnchor(id) | Self::FirstUnread(id) => {
                PageRequest::Around(id.clone())
            }
            Self::Latest => PageRequest::Latest,
        }
    }

    /// Anchor id, if any.
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Explicit(id) | Self::Highlight(id) | Self::ScrollAnchor(id) | Self::FirstUnread(id) => {
                Some(id)
            }
            Self::Latest => None,
        }
    }
}

/// Pick the initial anchor: explicit, then highlight, then scroll anchor,
/// then first unread, otherwise the newest page.
pub fn choose_initial_anchor(
    explicit: Option<MessageId>,
    highlight: Option<MessageId>,
    scroll_anchor: Option<MessageId>,
    first_unread: Option<MessageId>,
) -> InitialAnchor {
    explicit
        .map(InitialAnchor::Explicit)
        .or_else(|| highlight.map(InitialAnchor::Highlight))
        .or_else(|| scroll_anchor.map(InitialAnchor::ScrollAnchor))
        .or_else(|| first_unread.map(InitialAnchor::FirstUnread))
        .unwrap_or(InitialAnchor::Latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Option<MessageId> {
        Some(MessageId::from(s))
    }

    #[test]
    fn frontiers_are_monotonic_until_reset() {
        let mut f = Frontiers::default();
        assert!(!f.reached(Direction::Above));
        f.mark(Direction::Above);
        f.mark(Direction::Above);
        assert!(f.reached_earliest());
        assert!(!f.reached_latest());
        f.mark_both();
        assert!(f.reached(Direction::Below));
        f.reset();
        assert_eq!(f, Frontiers::default());
    }

    #[test]
    fn in_flight_rejects_second_claim() {
        let mut flight = InFlight::default();
        assert!(flight.try_begin(Direction::Above));
        assert!(!flight.try_begin(Direction::Above));
        assert!(flight.try_begin(Direction::Below));
        flight.finish(Direction::Above);
        assert!(!flight.is_loading(Direction::Above));
        assert!(flight.try_begin(Direction::Above));
    }

    #[test]
    fn explicit_anchor_wins() {
        let anchor = choose_initial_anchor(id("e"), id("h"), id("s"), id("u"));
        assert_eq!(anchor, InitialAnchor::Explicit(MessageId::from("e")));
        assert_eq!(anchor.page_request(), PageRequest::Around(MessageId::from("e")));
    }

    #[test]
    fn priority_falls_through_in_order() {
        assert_eq!(
            choose_initial_anchor(None, id("h"), id("s"), id("u")),
            InitialAnchor::Highlight(MessageId::from("h"))
        );
        assert_eq!(
            choose_initial_anchor(None, None, id("s"), id("u")),
            InitialAnchor::ScrollAnchor(MessageId::from("s"))
        );
        assert_eq!(
            choose_initial_anchor(None, None, None, id("u")),
            InitialAnchor::FirstUnread(MessageId::from("u"))
        );
    }

    #[test]
    fn nothing_means_latest() {
        let anchor = choose_initial_anchor(None, None, None, None);
        assert_eq!(anchor, InitialAnchor::Latest);
        assert_eq!(anchor.page_request(), PageRequest::Latest);
        assert!(anchor.message_id().is_none());
    }

    #[test]
    fn beyond_maps_direction() {
        let edge = MessageId::from("x");
        assert_eq!(PageRequest::beyond(Direction::Above, edge.clone()), PageRequest::Above(edge.clone()));
        assert_eq!(PageRequest::beyond(Direction::Below, edge.clone()), PageRequest::Below(edge));
    }
}
