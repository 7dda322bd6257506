//! Computer-control actions, the sink trait that executes them, and the
//! coordinate scaling between model (bitmap) space and screen (logical)
//! space (§3, §4.7, §6).

use async_trait::async_trait;

use crate::error::Result;

/// Default cap on the bitmap width shown to the model (§4.7, §6).
pub const DEFAULT_MAX_MODEL_WIDTH: u32 = 1024;

/// Direction for a scroll action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Parse the tool schema's `scroll_direction` field; unknown values
    /// fall back to `Down` rather than aborting the batch (§9).
    pub fn parse(raw: &str) -> Self {
        match raw {
            "up" => Self::Up,
            "left" => Self::Left,
            "right" => Self::Right,
            _ => Self::Down,
        }
    }
}

/// A single point in model (bitmap) coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One atomic input event, in model-space coordinates. The action sink
/// rescales coordinates into logical screen space before dispatch (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum ComputerAction {
    LeftClick { at: Point },
    RightClick { at: Point },
    DoubleClick { at: Point },
    MiddleClick { at: Point },
    Type { text: String },
    Key { chord: String },
    Scroll { at: Point, direction: ScrollDirection, amount: i64 },
    MouseMove { at: Point },
    LeftClickDrag { from: Point, to: Point },
    /// Reserved: the model never issues this as a tool call; screenshots
    /// are taken by the executor loop itself (§4.3.1).
    Screenshot,
    /// Query the current cursor position; no-op on most sinks.
    CursorPosition,
}

impl ComputerAction {
    /// Whether this variant is one of the click kinds tracked for
    /// repeat-click detection (§4.4).
    pub fn click_point(&self) -> Option<Point> {
        match self {
            Self::LeftClick { at } | Self::RightClick { at } | Self::DoubleClick { at } | Self::MiddleClick { at } => {
                Some(*at)
            }
            _ => None,
        }
    }

    /// Parse a tool-call's `input` object into an action. Unknown action
    /// names and missing optional fields never abort the batch — the
    /// caller logs a warning and skips the tool-use block (§9).
    pub fn from_tool_input(action_name: &str, input: &serde_json::Value) -> Option<Self> {
        let coordinate = |key: &str| -> Option<Point> {
            let arr = input.get(key)?.as_array()?;
            Some(Point { x: arr.first()?.as_f64()?, y: arr.get(1)?.as_f64()? })
        };

        match action_name {
            "left_click" => Some(Self::LeftClick { at: coordinate("coordinate")? }),
            "right_click" => Some(Self::RightClick { at: coordinate("coordinate")? }),
            "double_click" => Some(Self::DoubleClick { at: coordinate("coordinate")? }),
            "middle_click" => Some(Self::MiddleClick { at: coordinate("coordinate")? }),
            "type" => Some(Self::Type { text: input.get("text")?.as_str()?.to_string() }),
            "key" => Some(Self::Key { chord: input.get("key")?.as_str()?.to_string() }),
            "scroll" => {
                let direction = input.get("scroll_direction").and_then(|v| v.as_str()).unwrap_or("down");
                let amount = input.get("scroll_amount").and_then(|v| v.as_i64()).unwrap_or(3);
                Some(Self::Scroll { at: coordinate("coordinate")?, direction: ScrollDirection::parse(direction), amount })
            }
            "mouse_move" => Some(Self::MouseMove { at: coordinate("coordinate")? }),
            "left_click_drag" => {
                Some(Self::LeftClickDrag { from: coordinate("start_coordinate")?, to: coordinate("coordinate")? })
            }
            _ => None,
        }
    }
}

/// The two dimension pairs the screen source reports (§4.7): the real
/// screen, and the downscaled bitmap the model is told it sees.
#[derive(Debug, Clone, Copy)]
pub struct ScreenDimensions {
    pub logical_w: u32,
    pub logical_h: u32,
    pub bitmap_w: u32,
    pub bitmap_h: u32,
}

impl ScreenDimensions {
    /// Per-axis scale factor from bitmap space to logical space.
    pub fn scale(&self) -> (f64, f64) {
        (self.logical_w as f64 / self.bitmap_w as f64, self.logical_h as f64 / self.bitmap_h as f64)
    }

    fn scale_point(&self, p: Point) -> Point {
        let (sx, sy) = self.scale();
        Point { x: p.x * sx, y: p.y * sy }
    }

    /// Rescale a model-space action into logical screen coordinates.
    pub fn rescale(&self, action: &ComputerAction) -> ComputerAction {
        match action {
            ComputerAction::LeftClick { at } => ComputerAction::LeftClick { at: self.scale_point(*at) },
            ComputerAction::RightClick { at } => ComputerAction::RightClick { at: self.scale_point(*at) },
            ComputerAction::DoubleClick { at } => ComputerAction::DoubleClick { at: self.scale_point(*at) },
            ComputerAction::MiddleClick { at } => ComputerAction::MiddleClick { at: self.scale_point(*at) },
            ComputerAction::Scroll { at, direction, amount } => {
                ComputerAction::Scroll { at: self.scale_point(*at), direction: *direction, amount: *amount }
            }
            ComputerAction::MouseMove { at } => ComputerAction::MouseMove { at: self.scale_point(*at) },
            ComputerAction::LeftClickDrag { from, to } => {
                ComputerAction::LeftClickDrag { from: self.scale_point(*from), to: self.scale_point(*to) }
            }
            other => other.clone(),
        }
    }
}

/// Executes atomic input events in logical screen coordinates (§2, §6).
/// The concrete backend (mouse/keyboard/window driver) is an external
/// collaborator; this crate only defines the contract.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn dispatch(&self, action: &ComputerAction) -> Result<()>;

    /// Maximize the foreground window. Called idempotently, once per
    /// session, after the first successful tool-call batch (§4.3.1 step 5,
    /// §9 open question).
    async fn maximize_foreground_window(&self) -> Result<()>;
}
