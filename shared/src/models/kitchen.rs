//! Kitchen ticket model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One dish on a kitchen ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenTicketItem {
    pub name: String,
    pub quantity: u32,
    /// Preparation note (e.g. "less spicy")
    #[serde(default)]
    pub note: Option<String>,
}

impl KitchenTicketItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Kitchen order ticket, no monetary fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenTicketDocument {
    pub order_number: String,
    pub table_number: String,
    pub timestamp: NaiveDateTime,
    pub items: Vec<KitchenTicketItem>,
}
