//! Printer session
//!
//! The one object the application talks to for printing. It owns the
//! single printer connection, serializes every transmission through it
//! and hands anything that could not be delivered to the [`PrintQueue`].
//!
//! ```text
//! print_receipt ─▶ render ─▶ connected? ──no──▶ queue.insert ─▶ Queued
//!                                 │yes
//!                                 ▼
//!                          transport.write ──err──▶ queue.insert ─▶ Queued
//!                                 │ok
//!                                 ▼
//!                              Printed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;
use shared::models::{
    KitchenTicketDocument, KitchenTicketItem, NewPrintJob, PrintPayload, ReceiptDocument,
};
use shared::{AppError, ErrorCode};
use tally_printer::{
    ConnectOutcome, DisconnectEvent, DisconnectNotifier, PrintError, PrinterTransport,
    TransportKind,
};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::queue::PrintQueue;
use super::renderer::{KitchenTicketRenderer, ReceiptRenderer};
use super::state::{ConnectionState, LinkStatus};
use super::storage::QueueError;

/// Failure recorded when a write finishes after the link was lost
pub const DISCONNECTED_MID_WRITE: &str = "printer disconnected during transmission";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} printing is not supported on this device")]
    Unsupported(TransportKind),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// A failed print could not be recorded
    #[error("Print queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unsupported(kind) => AppError::printer_not_supported(kind.to_string()),
            SessionError::Connection(reason) => AppError::connection_failed(reason),
            SessionError::Queue(e) => {
                AppError::with_message(ErrorCode::PrintQueueUnavailable, e.to_string())
            }
        }
    }
}

/// Why a print was not delivered immediately
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("Printer not connected")]
    NotConnected,

    #[error("{0}")]
    WriteFailed(String),
}

impl From<DeliveryFailure> for AppError {
    fn from(failure: DeliveryFailure) -> Self {
        match failure {
            DeliveryFailure::NotConnected => AppError::not_connected(),
            DeliveryFailure::WriteFailed(message) => {
                AppError::with_message(ErrorCode::PrintFailed, message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed,
    /// Recorded as a pending job for later replay
    Queued {
        job_id: String,
        reason: DeliveryFailure,
    },
}

impl PrintOutcome {
    pub fn is_printed(&self) -> bool {
        matches!(self, PrintOutcome::Printed)
    }

    /// User-facing notice for a queued job, `None` once printed
    pub fn notice(&self) -> Option<AppError> {
        match self {
            PrintOutcome::Printed => None,
            PrintOutcome::Queued { job_id, reason } => {
                let cause = AppError::from(reason.clone());
                Some(
                    AppError::new(ErrorCode::PrintQueued)
                        .with_detail("job_id", job_id.as_str())
                        .with_detail("cause", cause.code.code())
                        .with_detail("reason", cause.message),
                )
            }
        }
    }
}

struct ActiveLink {
    kind: TransportKind,
    generation: u64,
    watcher: JoinHandle<()>,
}

struct Transports {
    wireless: Option<Box<dyn PrinterTransport>>,
    wired: Option<Box<dyn PrinterTransport>>,
    active: Option<ActiveLink>,
    next_generation: u64,
}

impl Transports {
    fn get_mut(&mut self, kind: TransportKind) -> Option<&mut Box<dyn PrinterTransport>> {
        match kind {
            TransportKind::Wireless => self.wireless.as_mut(),
            TransportKind::Wired => self.wired.as_mut(),
        }
    }

    /// Close the adapter's device handle
    async fn release(&mut self, kind: TransportKind) {
        if let Some(transport) = self.get_mut(kind)
            && let Err(e) = transport.disconnect().await
        {
            warn!(%kind, error = %e, "Printer disconnect failed");
        }
        info!(%kind, "Printer disconnected");
    }
}

/// Printer session manager
///
/// Holds at most one live connection. Each successful connect gets a new
/// generation number; the disconnect watcher for that connection only
/// resets state while its generation is still the live one.
pub struct PrinterSession {
    transports: Arc<Mutex<Transports>>,
    state: Arc<watch::Sender<ConnectionState>>,
    /// Generation of the live connection, 0 when none
    live_generation: Arc<AtomicU64>,
    wireless_supported: bool,
    wired_supported: bool,
    queue: Arc<dyn PrintQueue>,
    restaurant_id: String,
    receipt_renderer: ReceiptRenderer,
    kitchen_renderer: KitchenTicketRenderer,
    write_timeout: Option<Duration>,
}

impl PrinterSession {
    pub fn new(queue: Arc<dyn PrintQueue>, restaurant_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            transports: Arc::new(Mutex::new(Transports {
                wireless: None,
                wired: None,
                active: None,
                next_generation: 0,
            })),
            state: Arc::new(state),
            live_generation: Arc::new(AtomicU64::new(0)),
            wireless_supported: false,
            wired_supported: false,
            queue,
            restaurant_id: restaurant_id.into(),
            receipt_renderer: ReceiptRenderer::default(),
            kitchen_renderer: KitchenTicketRenderer::default(),
            write_timeout: None,
        }
    }

    pub fn with_wireless(mut self, transport: impl PrinterTransport + 'static) -> Self {
        self.wireless_supported = transport.is_supported();
        self.register(Box::new(transport), TransportKind::Wireless);
        self
    }

    pub fn with_wired(mut self, transport: impl PrinterTransport + 'static) -> Self {
        self.wired_supported = transport.is_supported();
        self.register(Box::new(transport), TransportKind::Wired);
        self
    }

    fn register(&mut self, transport: Box<dyn PrinterTransport>, kind: TransportKind) {
        // No watcher holds a clone before the first connect
        if let Some(transports) = Arc::get_mut(&mut self.transports) {
            let slot = match kind {
                TransportKind::Wireless => &mut transports.get_mut().wireless,
                TransportKind::Wired => &mut transports.get_mut().wired,
            };
            *slot = Some(transport);
        } else {
            warn!(%kind, "Transport registered after connect, ignored");
        }
    }

    pub fn with_receipt_renderer(mut self, renderer: ReceiptRenderer) -> Self {
        self.receipt_renderer = renderer;
        self
    }

    pub fn with_kitchen_renderer(mut self, renderer: KitchenTicketRenderer) -> Self {
        self.kitchen_renderer = renderer;
        self
    }

    /// Treat a write still running after `timeout` as failed
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    // ========== Capability / observable state ==========

    pub fn is_wireless_supported(&self) -> bool {
        self.wireless_supported
    }

    pub fn is_wired_supported(&self) -> bool {
        self.wired_supported
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn device_name(&self) -> Option<String> {
        self.state.borrow().device_name().map(str::to_string)
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    pub fn restaurant_id(&self) -> &str {
        &self.restaurant_id
    }

    /// Pending queued jobs for this session's restaurant
    pub async fn pending_count(&self) -> SessionResult<usize> {
        Ok(self.queue.count_pending(&self.restaurant_id).await?)
    }

    // ========== Connection lifecycle ==========

    /// `Ok(false)` when the user cancelled device selection
    pub async fn connect_wireless(&self) -> SessionResult<bool> {
        self.connect(TransportKind::Wireless).await
    }

    /// `Ok(false)` when the user cancelled device selection
    pub async fn connect_wired(&self) -> SessionResult<bool> {
        self.connect(TransportKind::Wired).await
    }

    #[instrument(skip(self))]
    async fn connect(&self, kind: TransportKind) -> SessionResult<bool> {
        let mut transports = self.transports.lock().await;
        if !transports.get_mut(kind).is_some_and(|t| t.is_supported()) {
            return Err(SessionError::Unsupported(kind));
        }

        // Only one transport may be live
        self.teardown(&mut transports).await;
        self.set_status(LinkStatus::Connecting { kind }, None);

        transports.next_generation += 1;
        let generation = transports.next_generation;
        let (notifier, events) = DisconnectNotifier::channel(kind);

        let result = match transports.get_mut(kind) {
            Some(transport) => {
                transport.on_disconnect(notifier);
                transport.connect().await
            }
            None => Err(PrintError::Unsupported(kind.to_string())),
        };

        match result {
            Ok(ConnectOutcome::Connected { device_name }) => {
                info!(%kind, device = %device_name, "Printer connected");
                // Published before the watcher exists so an early disconnect
                // event always lands after it
                self.state.send_modify(|s| {
                    self.live_generation.store(generation, Ordering::SeqCst);
                    s.status = LinkStatus::Connected { kind, device_name };
                    s.last_error = None;
                });

                let watcher = tokio::spawn(watch_disconnect(
                    events,
                    generation,
                    self.live_generation.clone(),
                    self.state.clone(),
                    self.transports.clone(),
                ));
                transports.active = Some(ActiveLink {
                    kind,
                    generation,
                    watcher,
                });
                Ok(true)
            }
            Ok(ConnectOutcome::Cancelled) => {
                info!(%kind, "Device selection cancelled");
                self.set_status(LinkStatus::Disconnected, None);
                Ok(false)
            }
            Err(PrintError::Unsupported(_)) => {
                self.set_status(LinkStatus::Disconnected, None);
                Err(SessionError::Unsupported(kind))
            }
            Err(e) => {
                let reason = match e {
                    PrintError::Connection(reason) => reason,
                    other => other.to_string(),
                };
                warn!(%kind, error = %reason, "Printer connection failed");
                self.set_status(
                    LinkStatus::Disconnected,
                    Some(format!("Connection failed: {}", reason)),
                );
                Err(SessionError::Connection(reason))
            }
        }
    }

    /// Close the active connection, if any
    pub async fn disconnect(&self) {
        let mut transports = self.transports.lock().await;
        self.teardown(&mut transports).await;
        self.set_status(LinkStatus::Disconnected, None);
    }

    async fn teardown(&self, transports: &mut Transports) {
        let Some(link) = transports.active.take() else {
            return;
        };

        // The aborted task drops the receiver once awaited, closing the notifier
        link.watcher.abort();
        let _ = link.watcher.await;
        let _ = self.live_generation.compare_exchange(
            link.generation,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        transports.release(link.kind).await;
    }

    fn set_status(&self, status: LinkStatus, last_error: Option<String>) {
        self.state.send_modify(|s| {
            s.status = status;
            s.last_error = last_error;
        });
    }

    // ========== Printing ==========

    /// Print a receipt, queueing it when it cannot be delivered now
    #[instrument(skip_all, fields(invoice = %document.invoice_number))]
    pub async fn print_receipt(
        &self,
        document: &ReceiptDocument,
        currency_symbol: &str,
    ) -> SessionResult<PrintOutcome> {
        let payload = PrintPayload::Receipt {
            document: document.clone(),
            currency_symbol: currency_symbol.to_string(),
        };
        self.submit(payload, document.order_id.clone()).await
    }

    /// Print a kitchen ticket stamped with the current local time
    #[instrument(skip(self, items))]
    pub async fn print_kitchen_ticket(
        &self,
        order_number: &str,
        table_number: &str,
        items: Vec<KitchenTicketItem>,
        order_id: Option<String>,
    ) -> SessionResult<PrintOutcome> {
        let document = KitchenTicketDocument {
            order_number: order_number.to_string(),
            table_number: table_number.to_string(),
            timestamp: Local::now().naive_local(),
            items,
        };
        self.submit(PrintPayload::KitchenTicket { document }, order_id)
            .await
    }

    /// Send a stored document to the printer without queueing on failure
    #[instrument(skip_all, fields(kind = ?payload.kind()))]
    pub async fn deliver(&self, payload: &PrintPayload) -> Result<(), DeliveryFailure> {
        let bytes = self.render(payload);
        self.transmit(&bytes).await
    }

    /// Encode a document with this session's renderers
    pub fn render(&self, payload: &PrintPayload) -> Vec<u8> {
        match payload {
            PrintPayload::Receipt {
                document,
                currency_symbol,
            } => self.receipt_renderer.render(document, currency_symbol),
            PrintPayload::KitchenTicket { document } => self.kitchen_renderer.render(document),
        }
    }

    async fn submit(
        &self,
        payload: PrintPayload,
        order_id: Option<String>,
    ) -> SessionResult<PrintOutcome> {
        // Encoded even when offline
        let bytes = self.render(&payload);

        let reason = match self.transmit(&bytes).await {
            Ok(()) => {
                info!(bytes = bytes.len(), "Printed");
                return Ok(PrintOutcome::Printed);
            }
            Err(reason) => reason,
        };

        let error = match &reason {
            DeliveryFailure::NotConnected => None,
            DeliveryFailure::WriteFailed(message) => {
                warn!(error = %message, "Print failed, queueing job");
                Some(message.clone())
            }
        };
        let job = self
            .queue
            .insert(NewPrintJob {
                restaurant_id: self.restaurant_id.clone(),
                order_id,
                payload,
                error,
            })
            .await?;

        info!(job_id = %job.id, kind = ?job.kind, "Print job queued");
        Ok(PrintOutcome::Queued {
            job_id: job.id,
            reason,
        })
    }

    /// Write one stream to the live transport
    ///
    /// The transport lock is held for the whole stream so two prints never
    /// interleave chunks.
    async fn transmit(&self, bytes: &[u8]) -> Result<(), DeliveryFailure> {
        let mut transports = self.transports.lock().await;
        let Some((kind, generation)) = transports.active.as_ref().map(|l| (l.kind, l.generation))
        else {
            return Err(DeliveryFailure::NotConnected);
        };
        if self.live_generation.load(Ordering::SeqCst) != generation {
            return Err(DeliveryFailure::NotConnected);
        }
        let Some(transport) = transports.get_mut(kind) else {
            return Err(DeliveryFailure::NotConnected);
        };

        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.write(bytes))
                .await
                .unwrap_or_else(|_| {
                    Err(PrintError::Timeout(format!(
                        "write did not finish within {} ms",
                        limit.as_millis()
                    )))
                }),
            None => transport.write(bytes).await,
        };

        let message = match result {
            Ok(()) if self.live_generation.load(Ordering::SeqCst) == generation => return Ok(()),
            Ok(()) => DISCONNECTED_MID_WRITE.to_string(),
            Err(e) => e.to_string(),
        };

        // A write failure alone leaves the link up
        self.state
            .send_modify(|s| s.last_error = Some(message.clone()));
        Err(DeliveryFailure::WriteFailed(message))
    }
}

/// Reset state on the first out-of-band disconnect of one connection,
/// then close the lost device
async fn watch_disconnect(
    mut events: mpsc::UnboundedReceiver<DisconnectEvent>,
    generation: u64,
    live_generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<ConnectionState>>,
    transports: Arc<Mutex<Transports>>,
) {
    let Some(event) = events.recv().await else {
        return;
    };

    // Checked under the state lock so a newer connection is never reset
    let reset = state.send_if_modified(|s| {
        if live_generation
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        s.status = LinkStatus::Disconnected;
        s.last_error = Some(format!("Printer disconnected: {}", event.reason));
        true
    });
    if !reset {
        return;
    }

    warn!(
        kind = %event.kind,
        device = ?event.device_name,
        reason = %event.reason,
        "Printer disconnected unexpectedly"
    );

    let mut transports = transports.lock().await;
    if transports
        .active
        .as_ref()
        .is_some_and(|link| link.generation == generation)
    {
        // Dropping our own handle detaches this task
        transports.active = None;
        transports.release(event.kind).await;
    }
}
