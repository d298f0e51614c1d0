//! Scroll-position bookkeeping for the message list.
//!
//! The host reports its scroll container as a [`Viewport`]; the reconciler
//! decides where the container should end up after the next render.
//! Two rules, kept apart by separate pending flags:
//! - prepend: keep the message under the reader's eye stationary by shifting
//!   `scroll_top` by the height the older page added;
//! - append: follow the bottom only if the reader was already there.

#[cfg(test)]
#[path = "scroll_test.rs"]
mod scroll_test;

/// Distance from the bottom still treated as "at the bottom".
pub const BOTTOM_TOLERANCE_PX: f64 = 1.0;

/// Scroll container metrics, in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self { scroll_top, scroll_height, client_height }
    }

    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        self.scroll_height - self.client_height <= self.scroll_top + BOTTOM_TOLERANCE_PX
    }

    /// Backfill trigger.
    #[must_use]
    pub fn is_at_top(&self) -> bool {
        self.scroll_top <= 0.0
    }

    #[must_use]
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.max_scroll_top();
    }
}

/// What [`ScrollReconciler::after_render`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrollAdjustment {
    Unchanged,
    /// Prepend correction applied; `delta` is the added content height.
    Anchored { delta: f64 },
    StuckToBottom,
}

#[derive(Clone, Debug, Default)]
pub struct ScrollReconciler {
    /// `scroll_height` captured right before an older page was applied.
    prepend_anchor: Option<f64>,
    /// Whether the viewport sat at the bottom before a live append.
    follow_bottom: Option<bool>,
}

impl ScrollReconciler {
    #[must_use]
    pub fn is_prepending(&self) -> bool {
        self.prepend_anchor.is_some()
    }

    /// Record the pre-prepend height. Call before the host renders the
    /// larger list. A second prepend before a render keeps the first anchor.
    pub fn before_prepend(&mut self, viewport: &Viewport) {
        self.prepend_anchor.get_or_insert(viewport.scroll_height);
    }

    /// Record whether the reader is at the bottom, evaluated against the
    /// pre-append state.
    pub fn before_append(&mut self, viewport: &Viewport) {
        self.follow_bottom.get_or_insert(viewport.is_at_bottom());
    }

    /// Apply pending corrections once the host knows the new content
    /// height. Must run before the host paints.
    pub fn after_render(&mut self, viewport: &mut Viewport, new_scroll_height: f64) -> ScrollAdjustment {
        viewport.scroll_height = new_scroll_height;
        let mut adjustment = ScrollAdjustment::Unchanged;

        if let Some(old_height) = self.prepend_anchor.take() {
            let delta = new_scroll_height - old_height;
            viewport.scroll_top = (viewport.scroll_top + delta).clamp(0.0, viewport.max_scroll_top());
            adjustment = ScrollAdjustment::Anchored { delta };
        }

        if self.follow_bottom.take() == Some(true) {
            viewport.scroll_to_bottom();
            adjustment = ScrollAdjustment::StuckToBottom;
        }

        adjustment
    }
}
