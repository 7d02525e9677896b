// File: ./src/model/display.rs
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Governs whether an entry's date or description is shown before and after it is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum EntryDisplayMode {
    #[strum(serialize = "hideAll")]
    HideAll,
    #[strum(serialize = "hideFuture")]
    HideFuture,
    #[strum(serialize = "showAll")]
    ShowAll,
}

impl EntryDisplayMode {
    /// Whether an entry in this mode may be revealed, given whether it is already due.
    pub fn reveals(self, is_due: bool) -> bool {
        match self {
            EntryDisplayMode::ShowAll => true,
            EntryDisplayMode::HideFuture => is_due,
            EntryDisplayMode::HideAll => false,
        }
    }

    /// Comma separated list of the accepted spellings, for error hints.
    pub fn valid_values() -> String {
        Self::iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
