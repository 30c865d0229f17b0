/// Callback posted to the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Notifications delivered by the host for the decorated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentEvent {
    MovedOrResized { was_moved: bool, was_resized: bool },
}

impl ComponentEvent {
    pub fn resized() -> Self {
        Self::MovedOrResized {
            was_moved: false,
            was_resized: true,
        }
    }

    pub fn moved() -> Self {
        Self::MovedOrResized {
            was_moved: true,
            was_resized: false,
        }
    }
}
