use super::*;
use serde_json::json;
use shared::{
    domain::{CartLineId, Money, ProductId},
    protocol::CartLineRecord,
};

fn requested() -> PageState {
    PageState::new(2, 10).expect("page")
}

fn product(id: &str, price: u64) -> Value {
    json!({ "_id": id, "name": format!("product {id}"), "price": price })
}

fn ids(result: &QueryResult) -> Vec<&str> {
    result.items.iter().map(|p| p.id.as_str()).collect()
}

#[test]
fn tolerates_empty_object_and_empty_array() {
    for raw in [json!({}), json!([])] {
        let result: QueryResult = normalize(&raw, requested());
        assert_eq!(result, QueryResult::empty(requested()));
    }
}

#[test]
fn failure_marker_yields_empty_page_at_requested_position() {
    let result: QueryResult = normalize(&json!({ "success": false }), requested());
    assert!(result.is_empty());
    assert_eq!(result.total, 0);
    assert_eq!((result.page, result.per_page), (2, 10));
}

#[test]
fn failure_marker_wins_over_present_items() {
    let raw = json!({ "success": false, "products": [product("a", 1)] });
    let result: QueryResult = normalize(&raw, requested());
    assert!(result.is_empty());
}

#[test]
fn products_field_keeps_order() {
    let raw = json!({ "products": [product("p1", 10), product("p2", 20)] });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(ids(&result), vec!["p1", "p2"]);
    assert_eq!(result.total, 2);
}

#[test]
fn bare_array_and_data_field_are_equivalent() {
    let bare: QueryResult = normalize(&json!([product("x", 5)]), requested());
    let data: QueryResult = normalize(&json!({ "data": [product("x", 5)] }), requested());
    assert_eq!(bare, data);
    assert_eq!(bare.items[0].price, Money(5));
}

#[test]
fn nested_data_object_with_products_is_found() {
    let raw = json!({
        "success": true,
        "data": { "products": [product("n1", 1)], "totalProducts": 40 }
    });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(ids(&result), vec!["n1"]);
    assert_eq!(result.total, 40);
}

#[test]
fn declared_total_is_never_below_item_count() {
    let raw = json!({ "products": [product("a", 1), product("b", 2)], "total": 1 });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(result.total, 2);

    let raw = json!({ "products": [product("a", 1)], "totalCount": 57 });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(result.total, 57);
}

#[test]
fn server_paging_echo_is_ignored() {
    let raw = json!({ "products": [product("a", 1)], "page": 9, "perPage": 99 });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!((result.page, result.per_page), (2, 10));
}

#[test]
fn undecodable_entries_are_skipped() {
    let raw = json!({ "products": [product("ok", 1), { "name": "no id" }, 17] });
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(ids(&result), vec!["ok"]);
    assert_eq!(result.total, 1);
}

#[test]
fn scalars_and_unknown_objects_degrade_to_empty() {
    for raw in [json!(null), json!("oops"), json!(42), json!({ "message": "hi" })] {
        let result: QueryResult = normalize(&raw, requested());
        assert!(result.is_empty());
    }
}

#[test]
fn fractional_prices_are_truncated() {
    let raw = json!([{ "id": "p", "price": 19.99, "oldPrice": "25.5" }]);
    let result: QueryResult = normalize(&raw, requested());
    assert_eq!(result.items[0].price, Money(19));
    assert_eq!(result.items[0].old_price, Some(Money(25)));
}

#[test]
fn cart_listing_reuses_list_normalization() {
    let raw = json!({
        "data": [
            { "_id": "c1", "productId": "p1", "quantity": 2, "price": 300, "subTotal": 600 }
        ]
    });
    let lines: Vec<CartLineRecord> = normalize_list(&raw);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].id, CartLineId::new("c1"));
    assert_eq!(lines[0].product_id, ProductId::new("p1"));

    let none: Vec<CartLineRecord> = normalize_list(&json!({ "success": false }));
    assert!(none.is_empty());
}

#[test]
fn record_is_found_at_top_level_or_nested() {
    let line = json!({ "_id": "c9", "productId": "p1", "quantity": 1, "price": 5 });
    for raw in [
        line.clone(),
        json!({ "success": true, "data": line.clone() }),
        json!({ "cartItem": line.clone() }),
    ] {
        match normalize_record::<CartLineRecord>(&raw) {
            RecordOutcome::Record(record) => assert_eq!(record.id, CartLineId::new("c9")),
            other => panic!("expected record, got {other:?}"),
        }
    }
}

#[test]
fn record_rejection_carries_message() {
    let raw = json!({ "success": false, "message": "out of stock" });
    assert_eq!(
        normalize_record::<CartLineRecord>(&raw),
        RecordOutcome::Rejected(Some("out of stock".to_string()))
    );
    assert_eq!(
        normalize_record::<CartLineRecord>(&json!({ "success": true })),
        RecordOutcome::Unrecognized
    );
}
