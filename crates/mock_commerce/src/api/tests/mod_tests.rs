use super::*;

fn store() -> CommerceStore {
    CommerceStore::new(demo_catalog())
}

fn add(user: &str, product: &str, quantity: u32) -> AddCartLineRequest {
    AddCartLineRequest {
        product_id: ProductId::new(product),
        quantity,
        user_id: UserId::new(user),
        price: Money(1),
        sub_total: Money(1),
        product_title: None,
        mutation_id: Uuid::new_v4(),
    }
}

fn update(quantity: u32) -> UpdateCartLineRequest {
    UpdateCartLineRequest {
        quantity,
        sub_total: Money::ZERO,
        mutation_id: Uuid::new_v4(),
    }
}

fn ids(page: &ProductPage) -> Vec<&str> {
    page.products.iter().map(|product| product.id.as_str()).collect()
}

#[tokio::test]
async fn category_listing_pages_through_matches() {
    let store = store();
    let query = CatalogQuery {
        cat_id: Some(CategoryId::new("shoes")),
        page: Some(2),
        per_page: Some(2),
        ..CatalogQuery::default()
    };
    let page = store.list_products(&query).await.expect("page");
    assert_eq!(ids(&page), vec!["p-102"]);
    assert_eq!(page.total_products, 3);

    let past_end = CatalogQuery {
        page: Some(9),
        ..query
    };
    let page = store.list_products(&past_end).await.expect("page");
    assert!(page.products.is_empty());
    assert_eq!(page.total_products, 3);
}

#[tokio::test]
async fn price_rating_and_location_narrow_results() {
    let store = store();
    let page = store
        .list_products(&CatalogQuery {
            sub_cat_id: Some(SubCategoryId::new("sneakers")),
            min_price: Some(5000),
            max_price: Some(9000),
            ..CatalogQuery::default()
        })
        .await
        .expect("price");
    assert_eq!(ids(&page), vec!["p-102"]);

    let page = store
        .list_products(&CatalogQuery {
            rating: Some(4.5),
            ..CatalogQuery::default()
        })
        .await
        .expect("rating");
    assert_eq!(ids(&page), vec!["p-100", "p-200", "p-301"]);

    let page = store
        .list_products(&CatalogQuery {
            location: Some("Lagos".into()),
            ..CatalogQuery::default()
        })
        .await
        .expect("location");
    assert!(page.products.is_empty());
}

#[tokio::test]
async fn invalid_listing_parameters_are_rejected() {
    let store = store();
    for query in [
        CatalogQuery {
            min_price: Some(10),
            max_price: Some(5),
            ..CatalogQuery::default()
        },
        CatalogQuery {
            rating: Some(6.0),
            ..CatalogQuery::default()
        },
        CatalogQuery {
            page: Some(0),
            ..CatalogQuery::default()
        },
    ] {
        let err = store.list_products(&query).await.expect_err("invalid");
        assert_eq!(err.code, ErrorCode::Validation);
    }
}

#[tokio::test]
async fn search_matches_names_case_insensitively() {
    let store = store();
    let found = store.search("  SHIRT ").await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_str(), "p-300");
    assert!(store.search(" ").await.is_empty());
}

#[tokio::test]
async fn add_uses_catalog_price_and_merges_same_product() {
    let store = store();
    let first = store.add_line(add("u1", "p-100", 2)).await.expect("add");
    assert_eq!(first.price, Money(4500));
    assert_eq!(first.sub_total, Money(9000));
    assert_eq!(first.product_title.as_deref(), Some("Canvas Sneaker"));

    let merged = store.add_line(add("u1", "p-100", 1)).await.expect("merge");
    assert_eq!(merged.id, first.id);
    assert_eq!(merged.quantity, 3);
    assert_eq!(store.cart(&UserId::new("u1")).await.len(), 1);
    assert!(store.cart(&UserId::new("u2")).await.is_empty());
}

#[tokio::test]
async fn retried_mutation_is_applied_once() {
    let store = store();
    let request = add("u1", "p-200", 2);
    let first = store.add_line(request.clone()).await.expect("add");
    let replay = store.add_line(request).await.expect("replay");
    assert_eq!(first, replay);
    assert_eq!(store.cart(&UserId::new("u1")).await[0].quantity, 2);

    let change = update(5);
    store
        .update_line(&first.id, change.clone())
        .await
        .expect("update");
    store.update_line(&first.id, change).await.expect("replay");
    assert_eq!(store.cart(&UserId::new("u1")).await[0].quantity, 5);
}

#[tokio::test]
async fn stock_limits_are_enforced() {
    let store = store();
    let err = store
        .add_line(add("u1", "p-201", 3))
        .await
        .expect_err("only two backpacks");
    assert_eq!(err.code, ErrorCode::OutOfStock);
    assert!(!err.success);

    let line = store.add_line(add("u1", "p-201", 2)).await.expect("add");
    let err = store
        .update_line(&line.id, update(3))
        .await
        .expect_err("over stock");
    assert_eq!(err.code, ErrorCode::OutOfStock);
    assert_eq!(store.cart(&UserId::new("u1")).await[0].quantity, 2);
}

#[tokio::test]
async fn unknown_products_and_lines_are_not_found() {
    let store = store();
    let err = store
        .add_line(add("u1", "nope", 1))
        .await
        .expect_err("unknown product");
    assert_eq!(err.code, ErrorCode::NotFound);

    let missing = CartLineId::new("line-404");
    let err = store
        .update_line(&missing, update(1))
        .await
        .expect_err("unknown line");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = store.remove_line(&missing).await.expect_err("unknown line");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn zero_quantity_is_a_validation_error() {
    let store = store();
    let err = store
        .add_line(add("u1", "p-100", 0))
        .await
        .expect_err("zero");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn removed_line_leaves_the_cart() {
    let store = store();
    let line = store.add_line(add("u1", "p-300", 1)).await.expect("add");
    let removed = store.remove_line(&line.id).await.expect("remove");
    assert_eq!(removed.id, line.id);
    assert!(store.cart(&UserId::new("u1")).await.is_empty());
}
