use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    config::{AverageCostInit, InventoryConfig},
    db::DbPool,
    entities::product::{self, Column as ProductColumn, Entity as Product},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input for creating a catalog product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub standard_cost: Decimal,
    pub sale_price: Decimal,
    pub min_stock: Decimal,
    pub max_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

/// Catalog fields a caller may change after creation. `None` leaves a
/// field untouched. Stock and average cost are ledger-owned and absent
/// on purpose.
#[derive(Debug, Clone, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub standard_cost: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

/// Service for managing the product catalog
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    config: InventoryConfig,
}

impl ProductService {
    /// Creates a new product service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: InventoryConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
        }
    }

    /// Creates a product with zero stock. The initial average cost follows
    /// the configured policy: zero, or seeded from the standard cost.
    #[instrument(skip(self))]
    pub async fn create_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        if input.standard_cost < Decimal::ZERO || input.sale_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "costs and prices must not be negative".to_string(),
            ));
        }
        if input.min_stock < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "minimum stock must not be negative".to_string(),
            ));
        }

        let sku = input.sku.trim().to_uppercase();

        let existing_product = Product::find()
            .filter(ProductColumn::Sku.eq(&sku))
            .one(db)
            .await
            .map_err(|e| {
                let msg = format!("Failed to check for existing product: {}", e);
                error!(%msg);
                ServiceError::db_error(msg)
            })?;

        if existing_product.is_some() {
            let msg = format!("Product with SKU '{}' already exists", sku);
            error!(%msg);
            return Err(ServiceError::Conflict(msg));
        }

        let average_cost = match self.config.average_cost_init {
            AverageCostInit::Zero => Decimal::ZERO,
            AverageCostInit::StandardCost => input.standard_cost,
        };

        let product_id = Uuid::new_v4();
        let product = product::ActiveModel {
            id: Set(product_id),
            sku: Set(sku.clone()),
            name: Set(input.name.clone()),
            description: Set(input.description.clone()),
            standard_cost: Set(input.standard_cost),
            average_cost: Set(average_cost),
            sale_price: Set(input.sale_price),
            stock_on_hand: Set(Decimal::ZERO),
            min_stock: Set(input.min_stock),
            max_stock: Set(input.max_stock),
            reorder_point: Set(input.reorder_point),
            ..Default::default()
        };

        let result = product.insert(db).await.map_err(|e| {
            let msg = format!("Failed to create product: {}", e);
            error!(%msg);
            ServiceError::db_error(msg)
        })?;

        self.event_sender
            .send(Event::ProductCreated(result.id))
            .await
            .map_err(|e| {
                let msg = format!("Failed to publish product created event: {}", e);
                error!(%msg);
                ServiceError::EventError(msg)
            })?;

        info!(product_id = %result.id, sku = %sku, "Product created successfully");

        Ok(result)
    }

    /// Get a product by ID
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &Uuid) -> Result<Option<product::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let product = Product::find_by_id(*id).one(db).await.map_err(|e| {
            error!(product_id = %id, error = %e, "Database error when fetching product");
            ServiceError::db_error(format!("Failed to get product: {}", e))
        })?;

        Ok(product)
    }

    /// Get a product by SKU (matched case-insensitively)
    #[instrument(skip(self))]
    pub async fn get_product_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<product::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let sku = sku.trim().to_uppercase();

        let product = Product::find()
            .filter(ProductColumn::Sku.eq(&sku))
            .one(db)
            .await
            .map_err(|e| {
                error!(%sku, error = %e, "Database error when fetching product by SKU");
                ServiceError::db_error(format!("Failed to get product by SKU: {}", e))
            })?;

        Ok(product)
    }

    /// Lists products ordered by name, optionally narrowed by a search
    /// term matched against name and SKU
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = Product::find();
        if let Some(term) = search.as_deref() {
            let term = term.trim();
            if !term.is_empty() {
                query = query.filter(
                    Condition::any()
                        .add(ProductColumn::Name.contains(term))
                        .add(ProductColumn::Sku.contains(&term.to_uppercase())),
                );
            }
        }

        let paginator = query.order_by_asc(ProductColumn::Name).paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            let msg = format!("Failed to count products: {}", e);
            error!(error = %e, "Database error when counting products");
            ServiceError::InternalError(msg)
        })?;

        let items = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            let msg = format!("Failed to fetch products: {}", e);
            error!(page = %page, limit = %limit, error = %e, "Database error when fetching products");
            ServiceError::InternalError(msg)
        })?;

        Ok((items, total))
    }

    /// Updates catalog fields. Stock and average cost are never touched
    /// here; those mutations belong to the ledger.
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: &Uuid,
        changes: UpdateProduct,
    ) -> Result<product::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let product = Product::find_by_id(*id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active_product: product::ActiveModel = product.into();
        if let Some(name) = changes.name {
            active_product.name = Set(name);
        }
        if let Some(description) = changes.description {
            active_product.description = Set(Some(description));
        }
        if let Some(standard_cost) = changes.standard_cost {
            active_product.standard_cost = Set(standard_cost);
        }
        if let Some(sale_price) = changes.sale_price {
            active_product.sale_price = Set(sale_price);
        }
        if let Some(min_stock) = changes.min_stock {
            active_product.min_stock = Set(min_stock);
        }
        if let Some(max_stock) = changes.max_stock {
            active_product.max_stock = Set(Some(max_stock));
        }
        if let Some(reorder_point) = changes.reorder_point {
            active_product.reorder_point = Set(Some(reorder_point));
        }

        let updated = active_product.update(db).await.map_err(|e| {
            let msg = format!("Failed to update product: {}", e);
            error!(product_id = %id, %msg);
            ServiceError::db_error(msg)
        })?;

        self.event_sender
            .send(Event::ProductUpdated(updated.id))
            .await
            .map_err(ServiceError::EventError)?;

        info!(product_id = %updated.id, "Product updated successfully");

        Ok(updated)
    }

    /// Soft-deletes a product. Movement history stays intact; the SKU can
    /// no longer be targeted by catalog updates through normal flows.
    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, id: &Uuid) -> Result<product::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let product = Product::find_by_id(*id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        if !product.is_active {
            return Ok(product);
        }

        let mut active_product: product::ActiveModel = product.into();
        active_product.is_active = Set(false);

        let updated = active_product
            .update(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        self.event_sender
            .send(Event::ProductDeactivated(updated.id))
            .await
            .map_err(ServiceError::EventError)?;

        info!(product_id = %updated.id, "Product deactivated");

        Ok(updated)
    }

    /// Active products whose low-stock alert is tripped. The alert is
    /// derived from current values on every read.
    #[instrument(skip(self))]
    pub async fn low_stock_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let products = Product::find()
            .filter(ProductColumn::IsActive.eq(true))
            .order_by_asc(ProductColumn::Name)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(products.into_iter().filter(|p| p.is_low_stock()).collect())
    }
}
