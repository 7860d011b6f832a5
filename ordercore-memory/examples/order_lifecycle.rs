//! Order lifecycle walkthrough against the in-memory adapters:
//! seed a member, an item, and a coupon, place a discounted order,
//! then cancel it and watch the stock come back.

use anyhow::Result;
use ordercore::delivery::{Address, City, Street, ZipCode};
use ordercore::{
    Coupon, CouponCode, ItemId, ItemName, ItemRecord, MemberId, MemberName, MemberRecord, Money,
    OrderService, PlaceOrder, Quantity,
};
use ordercore_memory::InMemoryStore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = InMemoryStore::new();

    let member_id = MemberId::try_new("MBR-KIM".to_string())?;
    store.put_member(MemberRecord::new(
        member_id.clone(),
        MemberName::try_new("Kim Youngsoo".to_string())?,
    ));

    let item_id = ItemId::try_new("ITM-JPABOOK".to_string())?;
    store.put_item(ItemRecord::new(
        item_id.clone(),
        ItemName::try_new("JPA Programming".to_string())?,
        Money::from_cents(2_000_000)?,
        10,
    ));

    store.put_coupon(Coupon::flat(
        CouponCode::try_new("WELCOME-5000".to_string())?,
        Money::from_cents(500_000)?,
    ));

    let service = OrderService::new(store.clone(), store.clone(), store.clone(), store.clone());

    info!("placing an order for 3 copies with the welcome coupon");
    let address = Address::new(
        City::try_new("Seoul".to_string())?,
        Street::try_new("123 Teheran-ro".to_string())?,
        ZipCode::try_new("06234".to_string())?,
    );
    let view = service
        .place_order(
            PlaceOrder::new(member_id.clone(), item_id.clone(), Quantity::new(3)?, address)
                .with_coupon(CouponCode::try_new("WELCOME-5000".to_string())?),
        )
        .await?;

    info!(
        order = %view.order_id,
        total = %view.total_price,
        discount = %view.discount_amount,
        stock_left = store.stock_of(&item_id).unwrap_or(0),
        "order placed"
    );

    info!("cancelling the order");
    service.cancel_order(&view.order_id, &member_id).await?;
    info!(
        stock_left = store.stock_of(&item_id).unwrap_or(0),
        "stock restored after cancellation"
    );

    Ok(())
}
