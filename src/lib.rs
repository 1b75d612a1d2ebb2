//! StockLedger
//!
//! Inventory ledger library for small-business ERP backends: a product
//! catalog with running stock and weighted-average cost, an append-only
//! movement journal, and a transactional movement processor. The crate has
//! no network or CLI surface of its own; the surrounding system constructs
//! movement requests and reads back the updated product state.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

pub use crate::errors::{AppError, ServiceError};

/// Capacity of the event channel created by [`AppState::connect`].
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Shared application state wiring the database, configuration, event
/// channel and services together for embedding callers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<services::inventory::InventoryService>,
    pub products: Arc<services::products::ProductService>,
}

impl AppState {
    /// Builds the service graph over an established connection. The caller
    /// owns the receiving end of the event channel; pass it to
    /// [`events::process_events`] or a custom consumer.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        sender: mpsc::Sender<events::Event>,
    ) -> Self {
        let event_sender = events::EventSender::new(sender);
        let services = AppServices {
            inventory: Arc::new(services::inventory::InventoryService::new(
                db.clone(),
                event_sender.clone(),
                config.inventory,
            )),
            products: Arc::new(services::products::ProductService::new(
                db.clone(),
                event_sender.clone(),
                config.inventory,
            )),
        };
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }

    /// Connects to the configured database, runs migrations, and builds
    /// the service graph. Returns the state and the event receiver.
    pub async fn connect(
        config: config::AppConfig,
    ) -> Result<(Self, mpsc::Receiver<events::Event>), AppError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        db::run_migrations(&pool).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok((Self::new(Arc::new(pool), config, tx), rx))
    }

    pub fn inventory_service(&self) -> Arc<services::inventory::InventoryService> {
        self.services.inventory.clone()
    }

    pub fn product_service(&self) -> Arc<services::products::ProductService> {
        self.services.products.clone()
    }
}
