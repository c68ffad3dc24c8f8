//! Trigger policy of a block, selected by its `#mode` property.

use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Use the function's declared default.
    #[default]
    Auto,
    OnLoad,
    OnChange,
    OnCall,
    Disabled,
}

impl Mode {
    /// Parse a `#mode` value; unknown values fall back to `Auto`.
    pub fn parse(value: &Value) -> Mode {
        match value.as_str() {
            Some("onLoad") => Mode::OnLoad,
            Some("onChange") => Mode::OnChange,
            Some("onCall") => Mode::OnCall,
            Some("disabled") => Mode::Disabled,
            _ => Mode::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::OnLoad => "onLoad",
            Mode::OnChange => "onChange",
            Mode::OnCall => "onCall",
            Mode::Disabled => "disabled",
        }
    }

    /// Effective `(run_on_change, run_on_load)` given the function default.
    pub fn triggers(self, default: Mode) -> (bool, bool) {
        let effective = if self == Mode::Auto { default } else { self };
        match effective {
            Mode::Auto | Mode::OnChange => (true, false),
            Mode::OnLoad => (true, true),
            Mode::OnCall | Mode::Disabled => (false, false),
        }
    }
}
