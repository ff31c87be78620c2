use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{CartLineId, CategoryId, Money, ProductId, SubCategoryId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{AddCartLineRequest, CartLineRecord, Product, UpdateCartLineRequest},
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;
const MAX_RATING: f32 = 5.0;

/// Catalog query parameters, as sent by the storefront client.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub cat_id: Option<CategoryId>,
    pub sub_cat_id: Option<SubCategoryId>,
    pub location: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub rating: Option<f32>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total_products: usize,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Default)]
struct StoreState {
    products: Vec<Product>,
    carts: HashMap<UserId, Vec<CartLineRecord>>,
    /// Results of already applied mutations, replayed for retries.
    applied: HashMap<Uuid, CartLineRecord>,
    next_line: u64,
}

impl StoreState {
    fn product(&self, product_id: &ProductId) -> Result<&Product, ApiError> {
        self.products
            .iter()
            .find(|product| &product.id == product_id)
            .ok_or_else(|| not_found(format!("product {product_id} does not exist")))
    }

    fn line_mut(&mut self, line_id: &CartLineId) -> Result<&mut CartLineRecord, ApiError> {
        self.carts
            .values_mut()
            .flat_map(|lines| lines.iter_mut())
            .find(|line| &line.id == line_id)
            .ok_or_else(|| not_found(format!("cart line {line_id} does not exist")))
    }
}

#[derive(Clone, Default)]
pub struct CommerceStore {
    inner: Arc<Mutex<StoreState>>,
}

impl CommerceStore {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState {
                products,
                ..StoreState::default()
            })),
        }
    }

    pub async fn product_count(&self) -> usize {
        self.inner.lock().await.products.len()
    }

    /// All listing endpoints share this; which parameters are present picks
    /// the filter.
    pub async fn list_products(&self, query: &CatalogQuery) -> Result<ProductPage, ApiError> {
        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page == 0 || per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(validation(format!(
                "page must be >= 1 and perPage within 1..={MAX_PER_PAGE}"
            )));
        }
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            if min > max {
                return Err(validation("minPrice must not exceed maxPrice"));
            }
        }
        if let Some(rating) = query.rating {
            if !(0.0..=MAX_RATING).contains(&rating) {
                return Err(validation("rating must be within 0..=5"));
            }
        }

        let state = self.inner.lock().await;
        let matching: Vec<&Product> = state
            .products
            .iter()
            .filter(|product| matches_query(product, query))
            .collect();
        let total_products = matching.len();
        let start = (page as usize - 1).saturating_mul(per_page as usize);
        let products = matching
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();
        Ok(ProductPage {
            products,
            total_products,
            page,
            per_page,
        })
    }

    pub async fn search(&self, text: &str) -> Vec<Product> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let state = self.inner.lock().await;
        state
            .products
            .iter()
            .filter(|product| product.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub async fn cart(&self, user_id: &UserId) -> Vec<CartLineRecord> {
        self.inner
            .lock()
            .await
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Adding a product already in the user's cart raises that line.
    pub async fn add_line(&self, req: AddCartLineRequest) -> Result<CartLineRecord, ApiError> {
        let mut state = self.inner.lock().await;
        if let Some(previous) = state.applied.get(&req.mutation_id) {
            debug!(mutation_id = %req.mutation_id, "cart: replaying applied add");
            return Ok(previous.clone());
        }
        ensure_quantity(req.quantity)?;
        let product = state.product(&req.product_id)?.clone();

        let existing = state
            .carts
            .get(&req.user_id)
            .and_then(|lines| lines.iter().find(|line| line.product_id == req.product_id))
            .map(|line| (line.id.clone(), line.quantity));
        let record = match existing {
            Some((line_id, quantity)) => {
                let quantity = quantity.saturating_add(req.quantity);
                ensure_stock(&product, quantity)?;
                let line = state.line_mut(&line_id)?;
                reprice(line, &product, quantity);
                line.clone()
            }
            None => {
                ensure_stock(&product, req.quantity)?;
                state.next_line += 1;
                let mut line = CartLineRecord {
                    id: CartLineId::new(format!("line-{}", state.next_line)),
                    product_id: product.id.clone(),
                    quantity: 0,
                    price: Money::ZERO,
                    sub_total: Money::ZERO,
                    product_title: None,
                };
                reprice(&mut line, &product, req.quantity);
                state
                    .carts
                    .entry(req.user_id.clone())
                    .or_default()
                    .push(line.clone());
                line
            }
        };
        info!(user_id = %req.user_id, line_id = %record.id, quantity = record.quantity, "cart: line added");
        state.applied.insert(req.mutation_id, record.clone());
        Ok(record)
    }

    pub async fn update_line(
        &self,
        line_id: &CartLineId,
        req: UpdateCartLineRequest,
    ) -> Result<CartLineRecord, ApiError> {
        let mut state = self.inner.lock().await;
        if let Some(previous) = state.applied.get(&req.mutation_id) {
            debug!(mutation_id = %req.mutation_id, "cart: replaying applied update");
            return Ok(previous.clone());
        }
        ensure_quantity(req.quantity)?;
        let product_id = state.line_mut(line_id)?.product_id.clone();
        let product = state.product(&product_id)?.clone();
        ensure_stock(&product, req.quantity)?;

        let line = state.line_mut(line_id)?;
        reprice(line, &product, req.quantity);
        let record = line.clone();
        info!(%line_id, quantity = record.quantity, "cart: line updated");
        state.applied.insert(req.mutation_id, record.clone());
        Ok(record)
    }

    pub async fn remove_line(&self, line_id: &CartLineId) -> Result<CartLineRecord, ApiError> {
        let mut state = self.inner.lock().await;
        for lines in state.carts.values_mut() {
            if let Some(index) = lines.iter().position(|line| &line.id == line_id) {
                let removed = lines.remove(index);
                info!(%line_id, "cart: line removed");
                return Ok(removed);
            }
        }
        Err(not_found(format!("cart line {line_id} does not exist")))
    }
}

fn matches_query(product: &Product, query: &CatalogQuery) -> bool {
    let category = query
        .cat_id
        .as_ref()
        .map_or(true, |id| product.cat_id.as_ref() == Some(id));
    let sub_category = query
        .sub_cat_id
        .as_ref()
        .map_or(true, |id| product.sub_cat_id.as_ref() == Some(id));
    let location = query.location.as_deref().map_or(true, |location| {
        product
            .location
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(location))
    });
    let min = query.min_price.map_or(true, |min| product.price >= Money(min));
    let max = query.max_price.map_or(true, |max| product.price <= Money(max));
    let rating = query
        .rating
        .map_or(true, |rating| product.rating.unwrap_or_default() >= rating);
    category && sub_category && location && min && max && rating
}

/// The server prices lines from its own catalog, whatever the client sent.
fn reprice(line: &mut CartLineRecord, product: &Product, quantity: u32) {
    line.quantity = quantity;
    line.price = product.price;
    line.sub_total = product.price.times(quantity);
    line.product_title = Some(product.name.clone());
}

fn ensure_quantity(quantity: u32) -> Result<(), ApiError> {
    if quantity == 0 {
        return Err(validation("quantity must be at least 1"));
    }
    Ok(())
}

fn ensure_stock(product: &Product, quantity: u32) -> Result<(), ApiError> {
    match product.count_in_stock {
        Some(available) if quantity > available => Err(ApiError::new(
            ErrorCode::OutOfStock,
            format!("only {available} of {} left in stock", product.name),
        )),
        _ => Ok(()),
    }
}

fn validation(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::Validation, message)
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::NotFound, message)
}

/// Small catalog used when no seed file is configured.
pub fn demo_catalog() -> Vec<Product> {
    let item = |id: &str, name: &str, price: u64, cat: &str, sub: &str, rating: f32, stock: u32| {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Money(price),
            old_price: None,
            rating: Some(rating),
            cat_id: Some(CategoryId::new(cat)),
            sub_cat_id: Some(SubCategoryId::new(sub)),
            location: Some("Accra".to_string()),
            count_in_stock: Some(stock),
            images: Vec::new(),
            created_at: None,
        }
    };
    vec![
        item("p-100", "Canvas Sneaker", 4500, "shoes", "sneakers", 4.5, 12),
        item("p-101", "Leather Boot", 12000, "shoes", "boots", 4.0, 4),
        item("p-102", "Running Shoe", 8000, "shoes", "sneakers", 3.5, 20),
        item("p-200", "Tote Bag", 3000, "bags", "totes", 4.8, 30),
        item("p-201", "Travel Backpack", 9500, "bags", "backpacks", 4.2, 2),
        item("p-300", "Linen Shirt", 2500, "fashion", "shirts", 3.9, 50),
        item("p-301", "Denim Jacket", 15000, "fashion", "jackets", 4.6, 0),
    ]
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
