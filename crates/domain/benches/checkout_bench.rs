use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartService, EventDispatcher, LoggingSubscriber, OrderPlacementService};
use store::{
    CatalogStore, CollectionId, InMemoryStore, Money, NewCollection, NewProduct, ProductId, UserId,
};

fn seed_catalog(rt: &tokio::runtime::Runtime, store: &InMemoryStore, count: i64) -> Vec<ProductId> {
    rt.block_on(async {
        let collection = store
            .insert_collection(NewCollection {
                title: "Bench".to_string(),
                featured_product: None,
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for n in 0..count {
            ids.push(insert_product(store, collection.id, n).await);
        }
        ids
    })
}

async fn insert_product(store: &InMemoryStore, collection_id: CollectionId, n: i64) -> ProductId {
    store
        .insert_product(NewProduct {
            title: format!("Product {n}"),
            slug: format!("product-{n}"),
            description: None,
            unit_price: Money::from_cents(100 + n),
            inventory: 100,
            collection_id,
        })
        .await
        .unwrap()
        .id
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let products = seed_catalog(&rt, &store, 1);
    let carts = CartService::new(store);
    let cart = rt.block_on(carts.create_cart()).unwrap();

    c.bench_function("checkout/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                carts.add_item(cart.id, products[0], 1).await.unwrap();
                carts.update_item_quantity(cart.id, products[0], 1).await.unwrap();
            });
        });
    });
}

fn bench_place_order(c: &mut Criterion, lines: i64) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let products = seed_catalog(&rt, &store, lines);
    let carts = CartService::new(store.clone());
    let checkout = OrderPlacementService::new(
        store,
        EventDispatcher::new().with_subscriber(std::sync::Arc::new(LoggingSubscriber)),
    );

    c.bench_function(&format!("checkout/place_order_{lines}_lines"), |b| {
        b.iter(|| {
            rt.block_on(async {
                let cart = carts.create_cart().await.unwrap();
                for product_id in &products {
                    carts.add_item(cart.id, *product_id, 2).await.unwrap();
                }
                checkout.place_order(cart.id, UserId::new(1)).await.unwrap();
            });
        });
    });
}

fn bench_place_order_small(c: &mut Criterion) {
    bench_place_order(c, 3);
}

fn bench_place_order_large(c: &mut Criterion) {
    bench_place_order(c, 50);
}

criterion_group!(
    benches,
    bench_add_item,
    bench_place_order_small,
    bench_place_order_large,
);
criterion_main!(benches);
