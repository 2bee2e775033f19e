//! Cursor and window over a list that may be longer than the screen.

use std::ops::Range;

/// Cursor position plus the slice of a list that is currently visible.
///
/// After every operation `cursor` lies in `[0, item_count - 1]` (0 when the
/// list is empty) and inside `viewport_start..viewport_start + viewport_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    cursor: usize,
    viewport_start: usize,
    item_count: usize,
    viewport_size: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, 10)
    }
}

impl Viewport {
    pub fn new(item_count: usize, viewport_size: usize) -> Self {
        let mut viewport = Self {
            cursor: 0,
            viewport_start: 0,
            item_count,
            viewport_size: viewport_size.max(1),
        };
        viewport.settle();
        viewport
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn viewport_start(&self) -> usize {
        self.viewport_start
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn viewport_size(&self) -> usize {
        self.viewport_size
    }

    fn last_index(&self) -> usize {
        self.item_count.saturating_sub(1)
    }

    fn max_start(&self) -> usize {
        self.item_count.saturating_sub(self.viewport_size)
    }

    /// Clamp the cursor, then slide the window so the cursor is visible.
    fn settle(&mut self) {
        self.cursor = self.cursor.min(self.last_index());
        self.viewport_start = self.viewport_start.min(self.max_start());
        if self.cursor < self.viewport_start {
            self.viewport_start = self.cursor;
        } else if self.cursor >= self.viewport_start + self.viewport_size {
            self.viewport_start = self.cursor + 1 - self.viewport_size;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
        self.settle();
    }

    pub fn move_down(&mut self) {
        self.cursor = (self.cursor + 1).min(self.last_index());
        self.settle();
    }

    pub fn top(&mut self) {
        self.cursor = 0;
        self.viewport_start = 0;
    }

    pub fn bottom(&mut self) {
        self.cursor = self.last_index();
        self.viewport_start = self.max_start();
        self.settle();
    }

    pub fn page_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(self.viewport_size);
        self.viewport_start = self.viewport_start.saturating_sub(self.viewport_size);
        self.settle();
    }

    pub fn page_down(&mut self) {
        self.cursor = (self.cursor + self.viewport_size).min(self.last_index());
        self.viewport_start = (self.viewport_start + self.viewport_size).min(self.max_start());
        self.settle();
    }

    /// Move the cursor to `index`, clamped.
    pub fn select(&mut self, index: usize) {
        self.cursor = index;
        self.settle();
    }

    /// New list length; the cursor stays put unless it falls off the end.
    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.settle();
    }

    /// New window height, at least one row.
    pub fn resize(&mut self, viewport_size: usize) {
        self.viewport_size = viewport_size.max(1);
        self.settle();
    }

    /// Indices currently on screen.
    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.viewport_start + self.viewport_size).min(self.item_count);
        self.viewport_start.min(end)..end
    }

    pub fn can_scroll_up(&self) -> bool {
        self.viewport_start > 0
    }

    pub fn can_scroll_down(&self) -> bool {
        self.visible_range().end < self.item_count
    }

    pub fn hidden_above(&self) -> usize {
        self.viewport_start
    }

    pub fn hidden_below(&self) -> usize {
        self.item_count - self.visible_range().end
    }

    /// Position label such as `"1-10 of 42"`, or `"0 items"`.
    pub fn showing(&self) -> String {
        if self.item_count == 0 {
            return "0 items".to_string();
        }
        let range = self.visible_range();
        format!("{}-{} of {}", range.start + 1, range.end, self.item_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(v: &Viewport) {
        if v.item_count() == 0 {
            assert_eq!(v.cursor(), 0);
        } else {
            assert!(v.cursor() < v.item_count());
        }
        assert!(v.viewport_start() <= v.cursor());
        assert!(v.cursor() < v.viewport_start() + v.viewport_size());
    }

    #[test]
    fn test_three_items_window_of_two() {
        let mut v = Viewport::new(3, 2);
        v.move_down();
        v.move_down();
        assert_eq!(v.cursor(), 2);
        assert_eq!(v.viewport_start(), 1);
        assert!(v.can_scroll_up());
        assert!(!v.can_scroll_down());
        assert_eq!(v.visible_range(), 1..3);
    }

    #[test]
    fn test_cursor_stays_in_bounds_for_move_sequences() {
        // Deterministic pseudo-random walk over several list shapes.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for count in [0usize, 1, 2, 5, 17, 100] {
            for size in [1usize, 3, 10] {
                let mut v = Viewport::new(count, size);
                for _ in 0..500 {
                    seed ^= seed << 13;
                    seed ^= seed >> 7;
                    seed ^= seed << 17;
                    match seed % 8 {
                        0 | 1 | 2 => v.move_down(),
                        3 | 4 => v.move_up(),
                        5 => v.page_down(),
                        6 => v.page_up(),
                        _ => {
                            if seed % 16 == 7 {
                                v.bottom()
                            } else {
                                v.top()
                            }
                        }
                    }
                    assert_invariants(&v);
                }
            }
        }
    }

    #[test]
    fn test_empty_list() {
        let mut v = Viewport::new(0, 5);
        v.move_down();
        v.page_down();
        v.bottom();
        assert_eq!(v.cursor(), 0);
        assert_eq!(v.visible_range(), 0..0);
        assert!(!v.can_scroll_up());
        assert!(!v.can_scroll_down());
        assert_eq!(v.showing(), "0 items");
    }

    #[test]
    fn test_page_down_and_up_clamp() {
        let mut v = Viewport::new(25, 10);
        v.page_down();
        assert_eq!((v.cursor(), v.viewport_start()), (10, 10));
        v.page_down();
        assert_eq!((v.cursor(), v.viewport_start()), (20, 15));
        v.page_down();
        assert_eq!((v.cursor(), v.viewport_start()), (24, 15));
        v.page_up();
        assert_eq!((v.cursor(), v.viewport_start()), (14, 5));
        v.page_up();
        v.page_up();
        assert_eq!((v.cursor(), v.viewport_start()), (0, 0));
    }

    #[test]
    fn test_bottom_then_top() {
        let mut v = Viewport::new(42, 10);
        v.bottom();
        assert_eq!(v.cursor(), 41);
        assert_eq!(v.viewport_start(), 32);
        assert_eq!(v.showing(), "33-42 of 42");
        assert_eq!(v.hidden_above(), 32);
        assert_eq!(v.hidden_below(), 0);
        v.top();
        assert_eq!(v.showing(), "1-10 of 42");
        assert_eq!(v.hidden_below(), 32);
    }

    #[test]
    fn test_shrinking_list_reclamps_cursor() {
        let mut v = Viewport::new(50, 10);
        v.bottom();
        v.set_item_count(5);
        assert_eq!(v.cursor(), 4);
        assert_eq!(v.viewport_start(), 0);
        assert_invariants(&v);
    }

    #[test]
    fn test_resize_keeps_cursor_visible() {
        let mut v = Viewport::new(30, 20);
        v.select(19);
        v.resize(5);
        assert_eq!(v.cursor(), 19);
        assert_eq!(v.viewport_start(), 15);
        v.resize(0);
        assert_eq!(v.viewport_size(), 1);
        assert_invariants(&v);
    }
}
