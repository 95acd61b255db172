use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::entities::{Location, RemovalReason, TransferDirection};

/// Post-commit notifications published by the ledger services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StockReceived {
        item_id: i64,
        location: Location,
        batch_id: i64,
        receipt_number: String,
        quantity: Decimal,
        unit_cost: Decimal,
    },
    StockConsumed {
        item_id: i64,
        location: Location,
        removal_id: i64,
        quantity: Decimal,
        unit_cost: Decimal,
        reason: RemovalReason,
    },
    StockTransferred {
        transfer_id: i64,
        receipt_number: String,
        direction: TransferDirection,
        line_count: usize,
    },
    BatchReversed {
        batch_id: i64,
        item_id: i64,
        location: Location,
        quantity: Decimal,
    },
    DriftCorrected {
        item_id: i64,
        location: Location,
        batch_id: i64,
        deficit: Decimal,
    },
    DriftDetected {
        item_id: i64,
        location: Location,
        registry_quantity: Decimal,
        batch_sum: Decimal,
    },
    IntegrityViolation {
        item_id: Option<i64>,
        message: String,
    },
    LowStock {
        item_id: i64,
        total_quantity: Decimal,
        reorder_level: Decimal,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockReceived { .. } => "stock_received",
            Event::StockConsumed { .. } => "stock_consumed",
            Event::StockTransferred { .. } => "stock_transferred",
            Event::BatchReversed { .. } => "batch_reversed",
            Event::DriftCorrected { .. } => "drift_corrected",
            Event::DriftDetected { .. } => "drift_detected",
            Event::IntegrityViolation { .. } => "integrity_violation",
            Event::LowStock { .. } => "low_stock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Publishes without waiting. Ledger writes have already committed by the
    /// time this runs, so a full or closed channel only drops the notification.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {
                counter!("stock_ledger.events.published", 1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("stock_ledger.events.dropped", 1);
                warn!(event = name, "event channel full; notification dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!("stock_ledger.events.dropped", 1);
                warn!(event = name, "event channel closed; notification dropped");
            }
        }
    }
}

/// Drains ledger events, logging each one until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::IntegrityViolation { item_id, message } => {
                error!(?item_id, %message, "ledger integrity violation");
            }
            Event::DriftDetected {
                item_id,
                location,
                registry_quantity,
                batch_sum,
            } => {
                warn!(
                    item_id,
                    %location,
                    %registry_quantity,
                    %batch_sum,
                    "registry drift detected"
                );
            }
            Event::LowStock {
                item_id,
                total_quantity,
                reorder_level,
            } => {
                warn!(item_id, %total_quantity, %reorder_level, "item at or below reorder level");
            }
            other => {
                info!(event = other.name(), payload = ?other, "ledger event");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn low_stock() -> Event {
        Event::LowStock {
            item_id: 1,
            total_quantity: dec!(3),
            reorder_level: dec!(10),
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_receiver() {
        let (sender, mut rx) = EventSender::channel(4);
        sender.publish(low_stock());
        assert_eq!(rx.recv().await, Some(low_stock()));
    }

    #[tokio::test]
    async fn publish_never_blocks_on_a_full_channel() {
        let (sender, mut rx) = EventSender::channel(1);
        sender.publish(low_stock());
        sender.publish(low_stock());
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_after_receiver_dropped_is_harmless() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.publish(low_stock());
        sender.publish(low_stock());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(low_stock()).unwrap();
        assert_eq!(json["type"], "low_stock");
    }
}
