use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CartLineId, CategoryId, Money, ProductId, SubCategoryId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_cat_id: Option<SubCategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_in_stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One line of the remote cart as echoed by the cart endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRecord {
    #[serde(alias = "_id")]
    pub id: CartLineId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub price: Money,
    #[serde(default)]
    pub sub_total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub user_id: UserId,
    pub price: Money,
    pub sub_total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    /// Idempotency key; a retried mutation reuses the same id.
    pub mutation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartLineRequest {
    pub quantity: u32,
    pub sub_total: Money,
    pub mutation_id: Uuid,
}
