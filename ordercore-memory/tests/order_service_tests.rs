//! Service-level integration tests for the order lifecycle, run against
//! the in-memory adapters.

use chrono::{Duration, Utc};
use ordercore::delivery::{Address, City, DeliveryStatus, Street, ZipCode};
use ordercore::store::{OrderStore, PageRequest, PageSize, SortOrder};
use ordercore::{
    Coupon, CouponCode, CouponIneligibility, DiscountRate, ItemId, ItemName, ItemRecord, MemberId,
    MemberName, MemberRecord, Money, OrderService, OrderStatus, PlaceOrder, Quantity, ServiceError,
};
use ordercore_memory::InMemoryStore;
use rust_decimal_macros::dec;

type Service = OrderService<InMemoryStore, InMemoryStore, InMemoryStore, InMemoryStore>;

fn service(store: &InMemoryStore) -> Service {
    OrderService::new(store.clone(), store.clone(), store.clone(), store.clone())
}

fn member_id() -> MemberId {
    MemberId::try_new("MBR-KIM".to_string()).unwrap()
}

fn item_id() -> ItemId {
    ItemId::try_new("ITM-BOOK1".to_string()).unwrap()
}

fn address() -> Address {
    Address::new(
        City::try_new("Seoul".to_string()).unwrap(),
        Street::try_new("123 Teheran-ro".to_string()).unwrap(),
        ZipCode::try_new("06234".to_string()).unwrap(),
    )
}

fn seeded_store(price: Money, stock: u32) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.put_member(MemberRecord::new(
        member_id(),
        MemberName::try_new("Kim".to_string()).unwrap(),
    ));
    store.put_item(ItemRecord::new(
        item_id(),
        ItemName::try_new("JPA Programming".to_string()).unwrap(),
        price,
        stock,
    ));
    store
}

fn place_request(quantity: u32) -> PlaceOrder {
    PlaceOrder::new(
        member_id(),
        item_id(),
        Quantity::new(quantity).unwrap(),
        address(),
    )
}

#[tokio::test]
async fn placing_an_order_reserves_stock_and_snapshots_the_price() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 10);
    let svc = service(&store);

    let view = svc.place_order(place_request(3)).await.unwrap();

    assert_eq!(store.stock_of(&item_id()), Some(7));
    assert_eq!(view.status, OrderStatus::Ordered);
    assert_eq!(view.delivery.status, DeliveryStatus::Placed);
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].quantity, 3);
    assert_eq!(view.lines[0].unit_price, Money::new(dec!(10000)).unwrap());
    assert_eq!(view.total_price, Money::new(dec!(30000)).unwrap());
    assert_eq!(view.member_name.as_ref(), "Kim");
}

#[tokio::test]
async fn placing_more_than_stock_fails_and_changes_nothing() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 2);
    let svc = service(&store);

    let err = svc.place_order(place_request(3)).await.unwrap_err();

    assert_eq!(
        err,
        ServiceError::OutOfStock {
            item: item_id(),
            requested: 3,
            available: 2,
        }
    );
    assert_eq!(store.stock_of(&item_id()), Some(2));
    let page = svc
        .list_orders(&member_id(), &PageRequest::first())
        .await
        .unwrap();
    assert!(page.is_empty());
}

#[tokio::test]
async fn cancelling_restores_the_reserved_stock() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 10);
    let svc = service(&store);

    let view = svc.place_order(place_request(3)).await.unwrap();
    assert_eq!(store.stock_of(&item_id()), Some(7));

    svc.cancel_order(&view.order_id, &member_id()).await.unwrap();

    assert_eq!(store.stock_of(&item_id()), Some(10));
    let after = svc.get_order(&view.order_id, &member_id()).await.unwrap();
    assert_eq!(after.status, OrderStatus::Canceled);
    assert_eq!(after.delivery.status, DeliveryStatus::Canceled);
}

#[tokio::test]
async fn cancelling_twice_is_rejected_and_releases_nothing_twice() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 10);
    let svc = service(&store);

    let view = svc.place_order(place_request(3)).await.unwrap();
    svc.cancel_order(&view.order_id, &member_id()).await.unwrap();

    let err = svc
        .cancel_order(&view.order_id, &member_id())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::CancellationNotAllowed {
            status: DeliveryStatus::Canceled,
        }
    );
    // Stock stays at the once-restored level.
    assert_eq!(store.stock_of(&item_id()), Some(10));
}

#[tokio::test]
async fn cancelling_a_shipped_order_is_rejected() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 10);
    let svc = service(&store);

    let view = svc.place_order(place_request(2)).await.unwrap();

    // External fulfillment advances the delivery.
    let mut order = OrderStore::find(&store, &view.order_id).await.unwrap().unwrap();
    order.mark_confirmed().unwrap();
    order.mark_shipped().unwrap();
    OrderStore::save(&store, &order).await.unwrap();

    let err = svc
        .cancel_order(&view.order_id, &member_id())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::CancellationNotAllowed {
            status: DeliveryStatus::Shipped,
        }
    );
    // The reservation stands; the sale is final.
    assert_eq!(store.stock_of(&item_id()), Some(8));
}

#[tokio::test]
async fn flat_coupon_discounts_the_total() {
    let store = seeded_store(Money::new(dec!(20000)).unwrap(), 5);
    store.put_coupon(Coupon::flat(
        CouponCode::try_new("WELCOME-5000".to_string()).unwrap(),
        Money::new(dec!(5000)).unwrap(),
    ));
    let svc = service(&store);

    let view = svc
        .place_order(
            place_request(1).with_coupon(CouponCode::try_new("WELCOME-5000".to_string()).unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(view.discount_amount, Money::new(dec!(5000)).unwrap());
    assert_eq!(view.total_price, Money::new(dec!(15000)).unwrap());
    assert_eq!(view.coupon_code.unwrap().as_ref(), "WELCOME-5000");
}

#[tokio::test]
async fn rate_coupon_discounts_exactly() {
    let store = seeded_store(Money::new(dec!(20000)).unwrap(), 5);
    store.put_coupon(Coupon::rate(
        CouponCode::try_new("SPRING25".to_string()).unwrap(),
        DiscountRate::from_percent(25).unwrap(),
    ));
    let svc = service(&store);

    let view = svc
        .place_order(
            place_request(1).with_coupon(CouponCode::try_new("SPRING25".to_string()).unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(view.discount_amount, Money::new(dec!(5000)).unwrap());
    assert_eq!(view.total_price, Money::new(dec!(15000)).unwrap());
}

#[tokio::test]
async fn unknown_coupon_fails_the_call_and_releases_the_reservation() {
    let store = seeded_store(Money::new(dec!(20000)).unwrap(), 5);
    let svc = service(&store);

    let code = CouponCode::try_new("NO-SUCH-CODE".to_string()).unwrap();
    let err = svc
        .place_order(place_request(1).with_coupon(code.clone()))
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::CouponNotFound(code));
    // Compensation: the reservation taken before coupon resolution is gone.
    assert_eq!(store.stock_of(&item_id()), Some(5));
    let page = svc
        .list_orders(&member_id(), &PageRequest::first())
        .await
        .unwrap();
    assert!(page.is_empty());
}

#[tokio::test]
async fn ineligible_coupon_fails_the_whole_call() {
    let store = seeded_store(Money::new(dec!(20000)).unwrap(), 5);
    store.put_coupon(
        Coupon::flat(
            CouponCode::try_new("MIN-50000".to_string()).unwrap(),
            Money::new(dec!(5000)).unwrap(),
        )
        .with_min_purchase(Money::new(dec!(50000)).unwrap()),
    );
    let svc = service(&store);

    let err = svc
        .place_order(
            place_request(1).with_coupon(CouponCode::try_new("MIN-50000".to_string()).unwrap()),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ServiceError::CouponNotApplicable(CouponIneligibility::MinPurchaseNotMet {
            required: Money::new(dec!(50000)).unwrap(),
            actual: Money::new(dec!(20000)).unwrap(),
        })
    );
    assert_eq!(store.stock_of(&item_id()), Some(5));
}

#[tokio::test]
async fn expired_coupon_fails_the_whole_call() {
    let store = seeded_store(Money::new(dec!(20000)).unwrap(), 5);
    store.put_coupon(
        Coupon::flat(
            CouponCode::try_new("LAST-YEAR".to_string()).unwrap(),
            Money::new(dec!(5000)).unwrap(),
        )
        .with_valid_until(Utc::now() - Duration::days(30)),
    );
    let svc = service(&store);

    let err = svc
        .place_order(
            place_request(1).with_coupon(CouponCode::try_new("LAST-YEAR".to_string()).unwrap()),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::CouponNotApplicable(CouponIneligibility::Expired { .. })
    ));
    assert_eq!(store.stock_of(&item_id()), Some(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn two_concurrent_orders_for_the_last_unit_sell_it_once() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 1);
    let svc = service(&store);

    let first = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.place_order(place_request(1)).await })
    };
    let second = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.place_order(place_request(1)).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::OutOfStock { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(out_of_stock, 1);
    assert_eq!(store.stock_of(&item_id()), Some(0));
}

#[tokio::test]
async fn address_update_follows_the_delivery_guard() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 5);
    let svc = service(&store);

    let view = svc.place_order(place_request(1)).await.unwrap();

    let new_address = Address::new(
        City::try_new("Busan".to_string()).unwrap(),
        Street::try_new("45 Haeundae-gil".to_string()).unwrap(),
        ZipCode::try_new("48094".to_string()).unwrap(),
    );
    let updated = svc
        .update_delivery_address(&view.order_id, &member_id(), new_address.clone())
        .await
        .unwrap();
    assert_eq!(updated.delivery.address, new_address);

    // Ship it, then try again.
    let mut order = OrderStore::find(&store, &view.order_id).await.unwrap().unwrap();
    order.mark_confirmed().unwrap();
    order.mark_shipped().unwrap();
    OrderStore::save(&store, &order).await.unwrap();

    let err = svc
        .update_delivery_address(&view.order_id, &member_id(), address())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::InvalidStateForUpdate {
            status: DeliveryStatus::Shipped,
        }
    );
}

#[tokio::test]
async fn only_the_owner_may_read_update_or_cancel() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 5);
    let stranger = MemberId::try_new("MBR-STRANGER".to_string()).unwrap();
    store.put_member(MemberRecord::new(
        stranger.clone(),
        MemberName::try_new("Stranger".to_string()).unwrap(),
    ));
    let svc = service(&store);

    let view = svc.place_order(place_request(1)).await.unwrap();

    let not_owner = ServiceError::NotOwner {
        order: view.order_id.clone(),
        caller: stranger.clone(),
    };
    assert_eq!(
        svc.get_order(&view.order_id, &stranger).await.unwrap_err(),
        not_owner
    );
    assert_eq!(
        svc.cancel_order(&view.order_id, &stranger).await.unwrap_err(),
        not_owner
    );
    assert_eq!(
        svc.update_delivery_address(&view.order_id, &stranger, address())
            .await
            .unwrap_err(),
        not_owner
    );
    // Nothing changed for the rightful owner.
    assert_eq!(store.stock_of(&item_id()), Some(4));
    let mine = svc.get_order(&view.order_id, &member_id()).await.unwrap();
    assert_eq!(mine.status, OrderStatus::Ordered);
}

#[tokio::test]
async fn missing_member_and_item_are_reported_verbatim() {
    let store = seeded_store(Money::new(dec!(10000)).unwrap(), 5);
    let svc = service(&store);

    let ghost_member = MemberId::try_new("MBR-GHOST".to_string()).unwrap();
    let err = svc
        .place_order(PlaceOrder::new(
            ghost_member.clone(),
            item_id(),
            Quantity::new(1).unwrap(),
            address(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::MemberNotFound(ghost_member));

    let ghost_item = ItemId::try_new("ITM-GHOST".to_string()).unwrap();
    let err = svc
        .place_order(PlaceOrder::new(
            member_id(),
            ghost_item.clone(),
            Quantity::new(1).unwrap(),
            address(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::ItemNotFound(ghost_item));
}

#[tokio::test]
async fn listing_pages_newest_first_by_default() {
    let store = seeded_store(Money::new(dec!(1000)).unwrap(), 100);
    let svc = service(&store);

    let mut placed = Vec::new();
    for _ in 0..5 {
        placed.push(svc.place_order(place_request(1)).await.unwrap().order_id);
    }

    let request = PageRequest::first().with_size(PageSize::try_new(2).unwrap());
    let page = svc.list_orders(&member_id(), &request).await.unwrap();

    assert_eq!(page.total_items, 5);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.len(), 2);
    // Newest first: the last order placed leads the first page.
    assert_eq!(page.items[0].order_id, placed[4]);
    assert_eq!(page.items[1].order_id, placed[3]);

    let last = svc
        .list_orders(&member_id(), &request.with_page(2))
        .await
        .unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last.items[0].order_id, placed[0]);

    let beyond = svc
        .list_orders(&member_id(), &request.with_page(9))
        .await
        .unwrap();
    assert!(beyond.is_empty());
    assert_eq!(beyond.total_items, 5);
}

#[tokio::test]
async fn listing_oldest_first_when_asked() {
    let store = seeded_store(Money::new(dec!(1000)).unwrap(), 100);
    let svc = service(&store);

    let mut placed = Vec::new();
    for _ in 0..3 {
        placed.push(svc.place_order(place_request(1)).await.unwrap().order_id);
    }

    let request = PageRequest::first().with_sort(SortOrder::OldestFirst);
    let page = svc.list_orders(&member_id(), &request).await.unwrap();

    let ids: Vec<_> = page.items.iter().map(|v| v.order_id.clone()).collect();
    assert_eq!(ids, placed);
}

#[tokio::test(flavor = "multi_thread")]
async fn stock_stress_many_concurrent_buyers() {
    let store = seeded_store(Money::new(dec!(1000)).unwrap(), 5);
    let svc = service(&store);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let svc = svc.clone();
        handles.push(tokio::spawn(
            async move { svc.place_order(place_request(1)).await },
        ));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(store.stock_of(&item_id()), Some(0));

    // Every sold unit is attached to exactly one order.
    let request = PageRequest::first().with_size(PageSize::try_new(100).unwrap());
    let page = svc.list_orders(&member_id(), &request).await.unwrap();
    assert_eq!(page.total_items, 5);
}
