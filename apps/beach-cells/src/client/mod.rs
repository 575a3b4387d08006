pub mod dispatcher;
pub mod frame;
pub mod surface;
pub mod tui;
pub mod viewport;

pub use dispatcher::{Dispatched, Dispatcher};
pub use surface::{HeadlessSurface, SlotHandle, ViewSurface};
pub use viewport::{ToggleSink, ViewportWindow};
