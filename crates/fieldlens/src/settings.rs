//! Editor configuration surface.

/// Radix used when displaying integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerFormat {
    #[default]
    Dec,
    Hex,
}

impl IntegerFormat {
    pub fn toggled(self) -> Self {
        match self {
            IntegerFormat::Dec => IntegerFormat::Hex,
            IntegerFormat::Hex => IntegerFormat::Dec,
        }
    }
}

/// Where parse and build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertMode {
    /// Inline on the calling thread.
    #[default]
    Foreground,
    /// On a worker thread; results are picked up by `Editor::poll`.
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSettings {
    /// Hide fields whose name is empty or starts with `_`.
    pub hide_protected: bool,
    pub integer_format: IntegerFormat,
    /// Maximum number of commands kept in the undo history.
    pub history_size: usize,
    pub convert_mode: ConvertMode,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            hide_protected: true,
            integer_format: IntegerFormat::Dec,
            history_size: 100,
            convert_mode: ConvertMode::Foreground,
        }
    }
}

impl EditorSettings {
    pub fn with_hide_protected(mut self, hide: bool) -> Self {
        self.hide_protected = hide;
        self
    }

    pub fn with_integer_format(mut self, format: IntegerFormat) -> Self {
        self.integer_format = format;
        self
    }

    /// Bound the history; values below 1 are raised to 1.
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size.max(1);
        self
    }

    pub fn with_convert_mode(mut self, mode: ConvertMode) -> Self {
        self.convert_mode = mode;
        self
    }
}
