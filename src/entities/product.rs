use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Product entity: catalog data plus the running stock and cost state
/// maintained by the inventory ledger.
///
/// `stock_on_hand` and `average_cost` are owned by the ledger; catalog
/// callers never write them directly.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// SKU (Stock Keeping Unit), unique, stored uppercase
    #[validate(length(
        min = 1,
        max = 50,
        message = "SKU must be between 1 and 50 characters"
    ))]
    pub sku: String,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Product description
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,

    /// Per-unit cost entered manually at creation time
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[validate(custom = "validate_non_negative")]
    pub standard_cost: Decimal,

    /// Per-unit weighted average cost, recomputed on incoming movements
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[validate(custom = "validate_non_negative")]
    pub average_cost: Decimal,

    /// Sale price per unit
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[validate(custom = "validate_non_negative")]
    pub sale_price: Decimal,

    /// Running on-hand quantity; the sum of signed effects of all applied
    /// movements, never observed negative
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub stock_on_hand: Decimal,

    /// Minimum quantity before the low-stock alert trips
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[validate(custom = "validate_non_negative")]
    pub min_stock: Decimal,

    /// Maximum stock level, informational
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub max_stock: Option<Decimal>,

    /// Threshold quantity that should trigger replenishment
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub reorder_point: Option<Decimal>,

    /// Soft-delete flag; inactive products stay queryable
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_movement::Entity")]
    InventoryMovements,
}

impl Related<super::inventory_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryMovements.def()
    }
}

impl Model {
    /// Low-stock alert: a pure function of current state, recomputed on
    /// every read, never stored.
    pub fn is_low_stock(&self) -> bool {
        self.stock_on_hand <= self.min_stock
    }

    /// Whether on-hand has fallen to the reorder point. Falls back to the
    /// low-stock alert when no reorder point is configured.
    pub fn needs_reorder(&self) -> bool {
        match self.reorder_point {
            Some(point) => self.stock_on_hand <= point,
            None => self.is_low_stock(),
        }
    }

    /// Total value of stock on hand at the current average cost.
    pub fn inventory_value(&self) -> Decimal {
        self.stock_on_hand * self.average_cost
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        // SKUs are matched case-insensitively by storing them uppercase.
        if let ActiveValue::Set(sku) = &active_model.sku {
            let normalized = sku.trim().to_uppercase();
            active_model.sku = Set(normalized);
        }

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }

            // Reorder point falls back to the minimum stock threshold.
            let missing_reorder_point = matches!(
                active_model.reorder_point,
                ActiveValue::NotSet | ActiveValue::Set(None)
            );
            if missing_reorder_point {
                if let ActiveValue::Set(min_stock) = &active_model.min_stock {
                    active_model.reorder_point = Set(Some(*min_stock));
                }
            }

            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Some(Utc::now()));

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
