use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::inventory_movement::MovementKind;

/// Events emitted by the ledger and catalog services. Emission happens
/// after commit only; a failed send never rolls back persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeactivated(Uuid),

    // Ledger events
    MovementApplied {
        movement_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        previous_stock: Decimal,
        new_stock: Decimal,
    },
    TransferCompleted {
        transfer_group_id: Uuid,
        source_product_id: Uuid,
        destination_product_id: Uuid,
        quantity: Decimal,
    },
    LowStockDetected {
        product_id: Uuid,
        sku: String,
        stock_on_hand: Decimal,
        min_stock: Decimal,
    },
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

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel and logs each event. Spawn as a background
/// task next to the service graph; custom consumers can replace it.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                sku,
                stock_on_hand,
                min_stock,
                ..
            } => {
                warn!(%sku, %stock_on_hand, %min_stock, "low stock threshold reached");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    info!("event channel closed, consumer stopping");
}
