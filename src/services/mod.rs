pub mod inventory;
pub mod products;

pub use inventory::InventoryService;
pub use products::ProductService;
