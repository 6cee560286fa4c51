//! Products domain module.
//!
//! Products own batches through their SKU; this crate only carries identity and the
//! validation rules for registering a product. No IO.

pub mod product;

pub use product::{NewProduct, Product, ProductId, Sku};
