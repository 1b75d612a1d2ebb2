use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    config::{InventoryConfig, StockPolicy},
    db::DbPool,
    entities::{
        inventory_movement::{self, Entity as InventoryMovement, MovementKind},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Scale of the stored cost columns. Weighted averages are rounded to this
/// scale before persisting, so no unrounded intermediate ever crosses an
/// invocation boundary.
const COST_SCALE: u32 = 4;

/// Request to apply one movement to a product's ledger.
#[derive(Debug, Clone)]
pub struct ApplyMovement {
    pub sku: String,
    pub kind: MovementKind,
    /// Positive magnitude; for adjustments the absolute stock level
    pub quantity: Decimal,
    /// Mandatory for receipts, optional for returns, ignored otherwise
    pub unit_cost: Option<Decimal>,
    /// When the movement is effective; must not be in the future
    pub occurred_at: DateTime<Utc>,
    pub lot: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reference_type: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl ApplyMovement {
    /// Movement effective now, with no traceability metadata.
    pub fn new(sku: impl Into<String>, kind: MovementKind, quantity: Decimal) -> Self {
        Self {
            sku: sku.into(),
            kind,
            quantity,
            unit_cost: None,
            occurred_at: Utc::now(),
            lot: None,
            serial_number: None,
            expiry_date: None,
            reference_type: None,
            reference_number: None,
            notes: None,
        }
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }
}

/// Request to move stock from one product's ledger to another's.
#[derive(Debug, Clone)]
pub struct TransferStock {
    pub source_sku: String,
    pub destination_sku: String,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

/// Outcome of a successfully applied movement.
#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub movement_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub previous_stock: Decimal,
    pub new_stock: Decimal,
    pub average_cost: Decimal,
    pub min_stock: Decimal,
    pub low_stock: bool,
}

/// Outcome of a completed transfer: the issue leg at the source and the
/// receipt leg at the destination, linked by one group id.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transfer_group_id: Uuid,
    pub issue: MovementOutcome,
    pub receipt: MovementOutcome,
}

/// Filters for the movement journal listing.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub kind: Option<MovementKind>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
}

/// Service owning the stock ledger. Every stock or average-cost mutation
/// goes through here, one transaction per movement: the product row is
/// re-read inside the transaction, the new state is computed from it, and
/// the product update plus the journal insert commit together.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    config: InventoryConfig,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: InventoryConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
        }
    }

    /// Applies a validated movement to its product: recomputes the weighted
    /// average cost for inbound movements, updates the running stock, and
    /// appends the journal row, all in a single transaction. No partial
    /// state is ever observable.
    #[instrument(skip(self))]
    pub async fn apply_movement(
        &self,
        command: ApplyMovement,
    ) -> Result<MovementOutcome, ServiceError> {
        validate_movement(&command)?;

        if command.kind == MovementKind::Transfer {
            return Err(ServiceError::InvalidMovement(
                "transfers carry two legs; use InventoryService::transfer".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let policy = self.config.stock_policy;
        let cmd = command.clone();

        let outcome = db
            .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                Box::pin(async move { apply_movement_leg(txn, &cmd, policy, None).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.emit_movement_events(&outcome).await?;

        Ok(outcome)
    }

    /// Moves stock between two products: an issue leg at the source and a
    /// receipt leg at the destination, committed together. The receipt leg
    /// is costed at the source's average cost, so a transfer never creates
    /// or destroys inventory value.
    #[instrument(skip(self))]
    pub async fn transfer(&self, command: TransferStock) -> Result<TransferOutcome, ServiceError> {
        if command.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidMovement(format!(
                "quantity must be positive, got {}",
                command.quantity
            )));
        }
        if command.occurred_at > Utc::now() {
            return Err(ServiceError::InvalidMovement(
                "movement date cannot be in the future".to_string(),
            ));
        }

        let source_sku = command.source_sku.trim().to_uppercase();
        let destination_sku = command.destination_sku.trim().to_uppercase();
        if source_sku == destination_sku {
            return Err(ServiceError::InvalidMovement(
                "transfer source and destination must differ".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let policy = self.config.stock_policy;
        let transfer_group_id = Uuid::new_v4();
        let cmd = command.clone();

        let (issue, receipt) = db
            .transaction::<_, (MovementOutcome, MovementOutcome), ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut issue_leg =
                        ApplyMovement::new(&cmd.source_sku, MovementKind::Issue, cmd.quantity);
                    issue_leg.occurred_at = cmd.occurred_at;
                    issue_leg.reference_type = Some("transfer".to_string());
                    issue_leg.reference_number = cmd.reference_number.clone();
                    issue_leg.notes = cmd.notes.clone();

                    let issue =
                        apply_movement_leg(txn, &issue_leg, policy, Some(transfer_group_id))
                            .await?;

                    // The destination receives at the source's average cost
                    // as of the issue.
                    let mut receipt_leg = ApplyMovement::new(
                        &cmd.destination_sku,
                        MovementKind::Receipt,
                        cmd.quantity,
                    )
                    .with_unit_cost(issue.average_cost);
                    receipt_leg.occurred_at = cmd.occurred_at;
                    receipt_leg.reference_type = Some("transfer".to_string());
                    receipt_leg.reference_number = cmd.reference_number.clone();
                    receipt_leg.notes = cmd.notes.clone();

                    let receipt =
                        apply_movement_leg(txn, &receipt_leg, policy, Some(transfer_group_id))
                            .await?;

                    Ok((issue, receipt))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.emit_movement_events(&issue).await?;
        self.emit_movement_events(&receipt).await?;
        self.event_sender
            .send(Event::TransferCompleted {
                transfer_group_id,
                source_product_id: issue.product_id,
                destination_product_id: receipt.product_id,
                quantity: command.quantity,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(TransferOutcome {
            transfer_group_id,
            issue,
            receipt,
        })
    }

    /// Gets one journal row by id
    #[instrument(skip(self))]
    pub async fn get_movement(
        &self,
        id: &Uuid,
    ) -> Result<Option<inventory_movement::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let movement = InventoryMovement::find_by_id(*id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(movement)
    }

    /// Lists journal rows, newest first, with optional filters and offset
    /// pagination
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_movement::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = InventoryMovement::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(inventory_movement::Column::ProductId.eq(product_id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(inventory_movement::Column::Kind.eq(kind.as_str()));
        }
        if let Some(from) = filter.occurred_from {
            query = query.filter(inventory_movement::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.occurred_to {
            query = query.filter(inventory_movement::Column::OccurredAt.lte(to));
        }

        let paginator = query
            .order_by_desc(inventory_movement::Column::OccurredAt)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            let msg = format!("Failed to count movements: {}", e);
            error!(error = %e, "Database error when counting movements");
            ServiceError::InternalError(msg)
        })?;

        let items = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            let msg = format!("Failed to fetch movements: {}", e);
            error!(page = %page, limit = %limit, error = %e, "Database error when fetching movements");
            ServiceError::InternalError(msg)
        })?;

        Ok((items, total))
    }

    async fn emit_movement_events(&self, outcome: &MovementOutcome) -> Result<(), ServiceError> {
        self.event_sender
            .send(Event::MovementApplied {
                movement_id: outcome.movement_id,
                product_id: outcome.product_id,
                kind: outcome.kind,
                quantity: outcome.quantity,
                previous_stock: outcome.previous_stock,
                new_stock: outcome.new_stock,
            })
            .await
            .map_err(ServiceError::EventError)?;

        if outcome.low_stock {
            self.event_sender
                .send(Event::LowStockDetected {
                    product_id: outcome.product_id,
                    sku: outcome.sku.clone(),
                    stock_on_hand: outcome.new_stock,
                    min_stock: outcome.min_stock,
                })
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(())
    }
}

/// Perpetual weighted average cost. The pre-update stock level weighs the
/// prior average against the incoming cost; a receipt into empty stock
/// takes the incoming cost directly. Rounded to the storage scale.
pub fn weighted_average_cost(
    stock_on_hand: Decimal,
    average_cost: Decimal,
    quantity: Decimal,
    unit_cost: Decimal,
) -> Decimal {
    if stock_on_hand > Decimal::ZERO {
        let total_value = stock_on_hand * average_cost + quantity * unit_cost;
        (total_value / (stock_on_hand + quantity)).round_dp(COST_SCALE)
    } else {
        unit_cost.round_dp(COST_SCALE)
    }
}

fn validate_movement(command: &ApplyMovement) -> Result<(), ServiceError> {
    if command.quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidMovement(format!(
            "quantity must be positive, got {}",
            command.quantity
        )));
    }

    match command.kind {
        MovementKind::Receipt => match command.unit_cost {
            Some(cost) if cost > Decimal::ZERO => {}
            Some(cost) => {
                return Err(ServiceError::InvalidMovement(format!(
                    "unit cost must be positive, got {}",
                    cost
                )));
            }
            None => {
                return Err(ServiceError::InvalidMovement(
                    "receipt movements require a unit cost".to_string(),
                ));
            }
        },
        MovementKind::Return => {
            if let Some(cost) = command.unit_cost {
                if cost <= Decimal::ZERO {
                    return Err(ServiceError::InvalidMovement(format!(
                        "unit cost must be positive, got {}",
                        cost
                    )));
                }
            }
        }
        _ => {}
    }

    if command.occurred_at > Utc::now() {
        return Err(ServiceError::InvalidMovement(
            "movement date cannot be in the future".to_string(),
        ));
    }

    Ok(())
}

/// One leg of the read-compute-write sequence, always inside the caller's
/// transaction. Validation has already happened at the service boundary.
async fn apply_movement_leg(
    txn: &DatabaseTransaction,
    command: &ApplyMovement,
    policy: StockPolicy,
    transfer_group_id: Option<Uuid>,
) -> Result<MovementOutcome, ServiceError> {
    let sku = command.sku.trim().to_uppercase();

    // Fresh, authoritative read inside the transaction.
    let product = Product::find()
        .filter(product::Column::Sku.eq(&sku))
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product with SKU '{}' not found", sku)))?;

    let previous_stock = product.stock_on_hand;

    // Average cost first, weighted by the pre-update stock level.
    let new_average_cost = match (command.kind, command.unit_cost) {
        (MovementKind::Receipt, Some(unit_cost)) | (MovementKind::Return, Some(unit_cost)) => {
            weighted_average_cost(
                previous_stock,
                product.average_cost,
                command.quantity,
                unit_cost,
            )
        }
        _ => product.average_cost,
    };

    let new_stock = match command.kind {
        MovementKind::Receipt | MovementKind::Return => previous_stock + command.quantity,
        MovementKind::Issue => {
            let remaining = previous_stock - command.quantity;
            if remaining < Decimal::ZERO {
                match policy {
                    StockPolicy::Reject => {
                        return Err(ServiceError::InsufficientStock(format!(
                            "insufficient stock for '{}': on hand {}, requested {}",
                            sku, previous_stock, command.quantity
                        )));
                    }
                    StockPolicy::ClampToZero => Decimal::ZERO,
                }
            } else {
                remaining
            }
        }
        // Absolute set, the one non-delta case.
        MovementKind::Adjustment => command.quantity,
        MovementKind::Transfer => {
            return Err(ServiceError::InvalidMovement(
                "transfer legs must be decomposed before application".to_string(),
            ));
        }
    };

    let mut active_product: product::ActiveModel = product.clone().into();
    active_product.stock_on_hand = Set(new_stock);
    active_product.average_cost = Set(new_average_cost);

    let updated = active_product
        .update(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let movement_id = Uuid::new_v4();
    let movement = inventory_movement::ActiveModel {
        id: Set(movement_id),
        product_id: Set(product.id),
        kind: Set(command.kind.as_str().to_string()),
        quantity: Set(command.quantity),
        unit_cost: Set(command.unit_cost),
        previous_stock: Set(previous_stock),
        new_stock: Set(new_stock),
        transfer_group_id: Set(transfer_group_id),
        lot: Set(command.lot.clone()),
        serial_number: Set(command.serial_number.clone()),
        expiry_date: Set(command.expiry_date),
        reference_type: Set(command.reference_type.clone()),
        reference_number: Set(command.reference_number.clone()),
        notes: Set(command.notes.clone()),
        occurred_at: Set(command.occurred_at),
        created_at: Set(Utc::now()),
    };

    movement
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    info!(
        %sku,
        kind = %command.kind,
        quantity = %command.quantity,
        previous_stock = %previous_stock,
        new_stock = %new_stock,
        "movement applied"
    );

    Ok(MovementOutcome {
        movement_id,
        product_id: product.id,
        sku,
        kind: command.kind,
        quantity: command.quantity,
        previous_stock,
        new_stock,
        average_cost: new_average_cost,
        min_stock: updated.min_stock,
        low_stock: updated.is_low_stock(),
    })
}
