//! Print queue records
//!
//! A job stores the structured document, never encoded bytes: the
//! replaying side re-encodes at flush time.

use super::kitchen::KitchenTicketDocument;
use super::receipt::ReceiptDocument;
use serde::{Deserialize, Serialize};

/// Job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintJobKind {
    Billing,
    Kitchen,
}

/// Job lifecycle: `pending` until a replay marks it `printed` or `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintJobStatus {
    Pending,
    Printed,
    Failed,
}

/// The document a job will re-encode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrintPayload {
    Receipt {
        document: ReceiptDocument,
        currency_symbol: String,
    },
    KitchenTicket {
        document: KitchenTicketDocument,
    },
}

impl PrintPayload {
    pub fn kind(&self) -> PrintJobKind {
        match self {
            PrintPayload::Receipt { .. } => PrintJobKind::Billing,
            PrintPayload::KitchenTicket { .. } => PrintJobKind::Kitchen,
        }
    }
}

/// Input for creating a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrintJob {
    pub restaurant_id: String,
    pub order_id: Option<String>,
    pub payload: PrintPayload,
    /// Why the immediate attempt did not deliver
    pub error: Option<String>,
}

/// Persisted print job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    pub restaurant_id: String,
    pub order_id: Option<String>,
    pub kind: PrintJobKind,
    pub payload: PrintPayload,
    pub status: PrintJobStatus,
    pub error: Option<String>,
    /// Replay attempts so far (the first submission is not counted)
    #[serde(default)]
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PrintJob {
    /// Materialize a pending job from its input
    pub fn pending(id: String, input: NewPrintJob, now: i64) -> Self {
        Self {
            id,
            restaurant_id: input.restaurant_id,
            order_id: input.order_id,
            kind: input.payload.kind(),
            payload: input.payload,
            status: PrintJobStatus::Pending,
            error: input.error,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PrintJobStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KitchenTicketItem;
    use chrono::NaiveDate;

    fn kitchen_payload() -> PrintPayload {
        PrintPayload::KitchenTicket {
            document: KitchenTicketDocument {
                order_number: "105".to_string(),
                table_number: "T12".to_string(),
                timestamp: NaiveDate::from_ymd_opt(2024, 3, 9)
                    .unwrap()
                    .and_hms_opt(19, 45, 0)
                    .unwrap(),
                items: vec![KitchenTicketItem::new("Paneer Tikka", 2)],
            },
        }
    }

    #[test]
    fn test_pending_job_takes_kind_from_payload() {
        let job = PrintJob::pending(
            "job-1".to_string(),
            NewPrintJob {
                restaurant_id: "r-1".to_string(),
                order_id: None,
                payload: kitchen_payload(),
                error: None,
            },
            1_700_000_000_000,
        );

        assert_eq!(job.kind, PrintJobKind::Kitchen);
        assert!(job.is_pending());
        assert_eq!(job.attempts, 0);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_payload_json_is_tagged() {
        let json = serde_json::to_value(kitchen_payload()).unwrap();
        assert_eq!(json["type"], "kitchen_ticket");
        assert_eq!(json["document"]["order_number"], "105");
    }
}
