//! Device selection
//!
//! Browsers show a chooser dialog; a native host gets a [`DeviceChooser`]
//! that picks from the devices matching the request filter. Returning
//! `None` is the user cancelling.

/// A device offered to the chooser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Backend-specific identifier (address, bus/port path)
    pub id: String,
    pub name: Option<String>,
}

/// Outcome of presenting the chooser
pub enum ChooserResult<D> {
    Selected(D),
    /// The chooser was shown and dismissed
    Cancelled,
    /// Nothing matched the request filter
    NoDevices,
}

pub trait DeviceChooser: Send + Sync {
    /// Index into `candidates`, or `None` to cancel
    fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize>;
}

/// Picks the first matching device
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstDevice;

impl DeviceChooser for FirstDevice {
    fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize> {
        if candidates.is_empty() { None } else { Some(0) }
    }
}

/// Picks the first device whose name contains the given text (case-insensitive)
#[derive(Debug, Clone)]
pub struct NamedDevice(pub String);

impl DeviceChooser for NamedDevice {
    fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize> {
        let needle = self.0.to_lowercase();
        candidates.iter().position(|c| {
            c.name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<DeviceCandidate> {
        vec![
            DeviceCandidate {
                id: "a".to_string(),
                name: None,
            },
            DeviceCandidate {
                id: "b".to_string(),
                name: Some("MPT-II Printer".to_string()),
            },
        ]
    }

    #[test]
    fn test_first_device() {
        assert_eq!(FirstDevice.choose(&candidates()), Some(0));
        assert_eq!(FirstDevice.choose(&[]), None);
    }

    #[test]
    fn test_named_device() {
        assert_eq!(NamedDevice("mpt".to_string()).choose(&candidates()), Some(1));
        assert_eq!(NamedDevice("epson".to_string()).choose(&candidates()), None);
    }
}
