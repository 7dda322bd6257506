//! Repeat-click detection within one direct-execution batch (§4.4).

use crate::action::{ComputerAction, Point};

const WINDOW_PX: f64 = 30.0;
const MIN_STREAK: usize = 2;

const WARNING_TEXT: &str = "You clicked the same spot multiple times without effect. \
Switch to keyboard navigation or an app-specific shortcut instead of repeating the click.";

/// Tracks click coordinates across the actions of one batch and raises a
/// warning once the streak looks stuck. Typing resets the record; escape,
/// tab, scroll, and mouse-move leave it untouched.
#[derive(Debug, Default)]
pub struct RepeatClickTracker {
    points: Vec<Point>,
}

impl RepeatClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one action from the batch. Returns the warning text the first
    /// time a streak of `MIN_STREAK` clicks all land within `WINDOW_PX` of
    /// the first, then clears the record.
    pub fn record(&mut self, action: &ComputerAction) -> Option<String> {
        match action {
            ComputerAction::LeftClick { at } | ComputerAction::RightClick { at } | ComputerAction::DoubleClick { at } => {
                self.points.push(*at);
                if self.points.len() >= MIN_STREAK && self.all_within_window() {
                    self.points.clear();
                    return Some(WARNING_TEXT.to_string());
                }
                None
            }
            ComputerAction::Type { .. } => {
                self.points.clear();
                None
            }
            _ => None,
        }
    }

    fn all_within_window(&self) -> bool {
        let first = self.points[0];
        self.points.iter().all(|p| (p.x - first.x).abs() <= WINDOW_PX && (p.y - first.y).abs() <= WINDOW_PX)
    }
}
