use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical movement taxonomy. The sign of the stock effect is derived
/// from the kind and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Issue,
    Adjustment,
    Return,
    Transfer,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Return => "return",
            MovementKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementKind::Receipt),
            "issue" => Some(MovementKind::Issue),
            "adjustment" => Some(MovementKind::Adjustment),
            "return" => Some(MovementKind::Return),
            "transfer" => Some(MovementKind::Transfer),
            _ => None,
        }
    }

    /// Kinds that add stock and may carry a unit cost.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementKind::Receipt | MovementKind::Return)
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable inventory event. Rows are append-only: created once and
/// never updated or deleted by the ledger.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,

    /// Stored as string in DB, converted to/from `MovementKind`
    pub kind: String,

    /// Positive magnitude; for adjustments the absolute stock level
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,

    /// Present on receipts (mandatory) and returns (optional)
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Option<Decimal>,

    /// On-hand quantity before this movement was applied
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub previous_stock: Decimal,

    /// On-hand quantity after this movement was applied
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub new_stock: Decimal,

    /// The two legs of a transfer share one group id
    pub transfer_group_id: Option<Uuid>,

    // Traceability metadata, opaque to the ledger
    pub lot: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<Date>,
    pub reference_type: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,

    /// When the movement is effective; never in the future
    pub occurred_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Decodes the stored kind string; `None` for rows written by a newer
    /// taxonomy than this build understands.
    pub fn movement_kind(&self) -> Option<MovementKind> {
        MovementKind::from_str(&self.kind)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
