//! Observable printer connection state

use tally_printer::TransportKind;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting {
        kind: TransportKind,
    },
    Connected {
        kind: TransportKind,
        device_name: String,
    },
}

/// The single connection state of a [`PrinterSession`](super::session::PrinterSession)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: LinkStatus,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self.status, LinkStatus::Connected { .. })
    }

    pub fn device_name(&self) -> Option<&str> {
        match &self.status {
            LinkStatus::Connected { device_name, .. } => Some(device_name),
            _ => None,
        }
    }

    /// Transport of a connected or connecting link
    pub fn transport(&self) -> Option<TransportKind> {
        match self.status {
            LinkStatus::Connecting { kind } | LinkStatus::Connected { kind, .. } => Some(kind),
            LinkStatus::Disconnected => None,
        }
    }
}
