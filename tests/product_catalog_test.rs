use std::sync::Arc;

use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use stockledger::{
    config::{AverageCostInit, InventoryConfig, StockPolicy},
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::inventory_movement::MovementKind,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::{ApplyMovement, InventoryService},
        products::{NewProduct, ProductService, UpdateProduct},
    },
};

async fn test_pool() -> DbPool {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = establish_connection_with_config(&config)
        .await
        .expect("Failed to create DB pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn setup(
    init: AverageCostInit,
) -> (Arc<DbPool>, ProductService, EventSender, mpsc::Receiver<Event>) {
    let pool = Arc::new(test_pool().await);
    let (tx, rx) = mpsc::channel(100);
    let sender = EventSender::new(tx);
    let config = InventoryConfig {
        stock_policy: StockPolicy::Reject,
        average_cost_init: init,
    };
    let service = ProductService::new(pool.clone(), sender.clone(), config);
    (pool, service, sender, rx)
}

fn new_product(sku: &str) -> NewProduct {
    NewProduct {
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        description: Some("Test item".to_string()),
        standard_cost: dec!(8),
        sale_price: dec!(12),
        min_stock: dec!(5),
        max_stock: Some(dec!(500)),
        reorder_point: None,
    }
}

#[tokio::test]
async fn duplicate_sku_is_a_conflict() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    products.create_product(new_product("DUP-001")).await.unwrap();
    let result = products.create_product(new_product("dup-001")).await;

    assert!(matches!(result, Err(ServiceError::Conflict(_))));
}

#[tokio::test]
async fn sku_is_stored_uppercase_and_matched_case_insensitively() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products
        .create_product(new_product("abc-001"))
        .await
        .unwrap();
    assert_eq!(created.sku, "ABC-001");

    let fetched = products
        .get_product_by_sku("abc-001")
        .await
        .unwrap()
        .expect("lookup by lowercase SKU");
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn average_cost_starts_at_zero_by_default() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products.create_product(new_product("INIT-001")).await.unwrap();
    assert_eq!(created.average_cost, dec!(0));
    assert_eq!(created.stock_on_hand, dec!(0));
}

#[tokio::test]
async fn average_cost_can_seed_from_standard_cost() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::StandardCost).await;

    let created = products.create_product(new_product("INIT-002")).await.unwrap();
    assert_eq!(created.average_cost, dec!(8));
}

#[tokio::test]
async fn reorder_point_defaults_to_min_stock() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products.create_product(new_product("REO-001")).await.unwrap();
    assert_eq!(created.reorder_point, Some(dec!(5)));

    let mut explicit = new_product("REO-002");
    explicit.reorder_point = Some(dec!(20));
    let created = products.create_product(explicit).await.unwrap();
    assert_eq!(created.reorder_point, Some(dec!(20)));
}

#[tokio::test]
async fn negative_costs_are_rejected() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let mut input = new_product("NEG-001");
    input.standard_cost = dec!(-1);
    let result = products.create_product(input).await;

    assert!(matches!(result, Err(ServiceError::ValidationError(_))));
}

#[tokio::test]
async fn update_changes_catalog_fields_only() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products.create_product(new_product("UPD-001")).await.unwrap();

    let updated = products
        .update_product(
            &created.id,
            UpdateProduct {
                name: Some("Renamed".to_string()),
                sale_price: Some(dec!(14.5)),
                min_stock: Some(dec!(9)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.sale_price, dec!(14.5));
    assert_eq!(updated.min_stock, dec!(9));
    // Ledger-owned state is untouched by catalog updates.
    assert_eq!(updated.stock_on_hand, created.stock_on_hand);
    assert_eq!(updated.average_cost, created.average_cost);
}

#[tokio::test]
async fn update_of_missing_product_is_not_found() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let result = products
        .update_product(&uuid::Uuid::new_v4(), UpdateProduct::default())
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn deactivation_is_idempotent() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products.create_product(new_product("DEA-001")).await.unwrap();

    let deactivated = products.deactivate_product(&created.id).await.unwrap();
    assert!(!deactivated.is_active);

    let again = products.deactivate_product(&created.id).await.unwrap();
    assert!(!again.is_active);
}

#[tokio::test]
async fn listing_searches_name_and_sku() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let mut gummy = new_product("GUM-001");
    gummy.name = "Gummy bears".to_string();
    products.create_product(gummy).await.unwrap();

    let mut lollipop = new_product("LOL-001");
    lollipop.name = "Lollipop".to_string();
    products.create_product(lollipop).await.unwrap();

    let (all, total) = products.list_products(None, 1, 50).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);

    let (by_name, _) = products
        .list_products(Some("Gummy".to_string()), 1, 50)
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].sku, "GUM-001");

    let (by_sku, _) = products
        .list_products(Some("lol-".to_string()), 1, 50)
        .await
        .unwrap();
    assert_eq!(by_sku.len(), 1);
    assert_eq!(by_sku[0].sku, "LOL-001");
}

#[tokio::test]
async fn low_stock_report_is_derived_from_current_values() {
    let (pool, products, sender, _rx) = setup(AverageCostInit::Zero).await;
    let inventory = InventoryService::new(
        pool,
        sender,
        InventoryConfig {
            stock_policy: StockPolicy::Reject,
            average_cost_init: AverageCostInit::Zero,
        },
    );

    // Fresh products start at zero stock, at or below any minimum.
    let low = products.create_product(new_product("LOW-001")).await.unwrap();

    let mut healthy_input = new_product("OK-001");
    healthy_input.min_stock = dec!(1);
    let healthy = products.create_product(healthy_input).await.unwrap();
    inventory
        .apply_movement(
            ApplyMovement::new("OK-001", MovementKind::Receipt, dec!(10))
                .with_unit_cost(dec!(2)),
        )
        .await
        .unwrap();

    let report = products.low_stock_products().await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].id, low.id);

    // Raising the threshold pulls the stocked product into the report.
    products
        .update_product(
            &healthy.id,
            UpdateProduct {
                min_stock: Some(dec!(20)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let report = products.low_stock_products().await.unwrap();
    assert_eq!(report.len(), 2);
}

#[tokio::test]
async fn deactivated_products_leave_the_low_stock_report() {
    let (_pool, products, _sender, _rx) = setup(AverageCostInit::Zero).await;

    let created = products.create_product(new_product("GONE-001")).await.unwrap();
    assert_eq!(products.low_stock_products().await.unwrap().len(), 1);

    products.deactivate_product(&created.id).await.unwrap();
    assert!(products.low_stock_products().await.unwrap().is_empty());
}
