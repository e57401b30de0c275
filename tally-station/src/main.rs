use std::sync::Arc;

use shared::AppError;
use tally_printer::TransportKind;
use tally_station::{PrinterSession, QueueReplayer, RedbPrintQueue, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment (dotenv, work dir, logging) and config
    let config = setup_environment()?;

    tracing::info!(
        restaurant_id = %config.restaurant_id,
        transport = %config.printer_transport,
        "Tally station starting queue replay"
    );

    // 2. Queue
    let queue = Arc::new(RedbPrintQueue::open(
        config.queue_db_path(),
        config.queue_policy(),
    )?);
    let stats = queue.get_stats()?;
    tracing::info!(
        jobs = stats.job_count,
        pending = stats.pending_count,
        "Print queue opened"
    );

    // 3. Session with whatever transports this build carries
    let session = PrinterSession::new(queue.clone(), &config.restaurant_id)
        .with_receipt_renderer(config.receipt_renderer())
        .with_kitchen_renderer(config.kitchen_renderer())
        .with_write_timeout(config.write_timeout());

    #[cfg(feature = "usb")]
    let session = session.with_wired(tally_printer::WiredTransport::new(
        tally_printer::NusbHost::new(tally_printer::FirstDevice),
    ));

    #[cfg(feature = "ble")]
    let session = match tally_printer::BleCentral::new(tally_printer::FirstDevice).await {
        Ok(central) => session.with_wireless(tally_printer::WirelessTransport::new(central)),
        Err(e) => {
            tracing::warn!("Bluetooth unavailable: {}", e);
            session
        }
    };

    // 4. Connect
    let connected = match config.printer_transport {
        TransportKind::Wired => session.connect_wired().await,
        TransportKind::Wireless => session.connect_wireless().await,
    };
    match connected {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!("No printer selected, pending jobs left in queue");
            return Ok(());
        }
        Err(e) => {
            let err = AppError::from(e);
            tracing::error!(code = ?err.code, "{}", err);
            return Ok(());
        }
    }

    // 5. Replay, then release the printer
    let replayer = QueueReplayer::new(queue, &config.restaurant_id, config.queue_policy())
        .with_default_currency(&config.currency_symbol);
    let result = replayer.replay_pending(&session).await;
    session.disconnect().await;

    let summary = result?;
    tracing::info!(
        printed = summary.printed,
        retried = summary.retried,
        failed = summary.failed,
        skipped = summary.skipped,
        "Queue replay complete"
    );

    Ok(())
}
