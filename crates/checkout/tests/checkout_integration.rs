//! End-to-end service scenarios against the in-memory store, including the
//! concurrency races the store must settle.

use std::collections::HashSet;
use std::time::Duration;

use checkout::{RetryPolicy, ServiceError, Storefront};
use chrono::Utc;
use common::{Money, ProductId, UserId};
use domain::{
    Actor, CheckoutRequest, DiscountRule, ErrorKind, GuestCartItem, LedgerEntryType, NewCoupon,
    NewProduct, OrderStatus, PaymentMethod, PaymentStatus, PhysicalCount, PricingPolicy, Product,
    ShippingAddress, StockAdjustment, replay,
};
use store::{InMemoryStore, LedgerQuery, OrderQuery, Store};

fn storefront(policy: PricingPolicy) -> (Storefront<InMemoryStore>, InMemoryStore) {
    let store = InMemoryStore::new();
    let retry = RetryPolicy::new(10, Duration::from_millis(1));
    (Storefront::new(store.clone(), policy, retry), store)
}

fn admin() -> Actor {
    Actor::admin(UserId::new())
}

fn request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: ShippingAddress {
            street: "742 Evergreen Terrace".to_string(),
            city: "Springfield".to_string(),
            state: "OR".to_string(),
            postal_code: "97403".to_string(),
            country: "US".to_string(),
        },
        payment_method: PaymentMethod::CreditCard,
        notes: None,
    }
}

async fn product(shop: &Storefront<InMemoryStore>, sku: &str, price: i64, stock: i64) -> Product {
    shop.inventory
        .create_product(
            &admin(),
            NewProduct {
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                price: Money::from_cents(price),
                sale_price: None,
                initial_stock: stock,
                is_active: true,
            },
        )
        .await
        .unwrap()
}

async fn coupon(
    shop: &Storefront<InMemoryStore>,
    code: &str,
    rule: DiscountRule,
    usage_limit: Option<u32>,
) {
    let now = Utc::now();
    shop.coupons
        .create(
            &admin(),
            NewCoupon {
                code: code.to_string(),
                rule,
                min_purchase: Some(Money::zero()),
                max_discount: Some(Money::from_cents(5000)),
                usage_limit,
                per_user_limit: None,
                valid_from: now - chrono::Duration::days(1),
                valid_until: now + chrono::Duration::days(30),
                is_active: true,
            },
        )
        .await
        .unwrap();
}

fn kind(err: &ServiceError) -> Option<ErrorKind> {
    err.kind()
}

#[tokio::test]
async fn scenario_two_units_with_ten_percent_coupon() {
    let (shop, store) = storefront(PricingPolicy {
        shipping_cost: Money::from_cents(10),
        tax_rate_bps: 1000,
    });
    let a = product(&shop, "A", 1000, 5).await;
    coupon(&shop, "TENOFF", DiscountRule::Percentage(10), None).await;

    let user = UserId::new();
    shop.carts.add_item(user, a.id, 2).await.unwrap();
    let preview = shop.carts.apply_coupon(user, "tenoff").await.unwrap();
    assert_eq!(preview.subtotal, Money::from_cents(2000));
    assert_eq!(preview.discount, Money::from_cents(200));
    assert!(preview.problems.is_empty());

    let order = shop.orders.create_order(user, request()).await.unwrap();
    assert_eq!(order.subtotal, Money::from_cents(2000));
    assert_eq!(order.discount, Money::from_cents(200));
    assert_eq!(order.tax, Money::from_cents(180));
    assert_eq!(order.shipping_cost, Money::from_cents(10));
    assert_eq!(order.total, Money::from_cents(1990));
    assert_eq!(order.coupon_code.as_deref(), Some("TENOFF"));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let stored = store.get_product(a.id).await.unwrap().unwrap();
    assert_eq!(stored.stock_quantity, 3);
    let sales = shop
        .inventory
        .ledger(LedgerQuery::for_product(a.id).entry_types(vec![LedgerEntryType::Sale]))
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].quantity, -2);
    assert_eq!(sales[0].reason, order.order_number.as_str());

    let cart = shop.carts.get_cart(user).await.unwrap();
    assert!(cart.lines.is_empty());
    assert!(cart.coupon_code.is_none());
}

#[tokio::test]
async fn validating_an_exhausted_coupon_reports_usage_limit_without_mutation() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    coupon(&shop, "ONCE", DiscountRule::FixedAmount(Money::from_cents(300)), Some(1)).await;

    let first = UserId::new();
    shop.carts.add_item(first, a.id, 1).await.unwrap();
    shop.carts.apply_coupon(first, "ONCE").await.unwrap();
    shop.orders.create_order(first, request()).await.unwrap();

    let validation = shop
        .coupons
        .validate("ONCE", UserId::new(), Money::from_cents(1000))
        .await
        .unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.message.as_deref(), Some("usage limit reached"));

    let stored = store.get_coupon_by_code("ONCE").await.unwrap().unwrap();
    assert_eq!(stored.used_count, 1);
    let usages = shop.coupons.usages(&admin(), "once").await.unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].user_id, first);
}

#[tokio::test]
async fn unknown_coupon_code_is_a_rejection_not_an_error() {
    let (shop, _) = storefront(PricingPolicy::default());
    let validation = shop
        .coupons
        .validate("NOPE", UserId::new(), Money::from_cents(1000))
        .await
        .unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.message.as_deref(), Some("coupon not found"));
}

#[tokio::test]
async fn adjusting_below_zero_fails_and_changes_nothing() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 3).await;
    let before = store.ledger_len().await;

    let err = shop
        .inventory
        .adjust_stock(
            &admin(),
            StockAdjustment {
                product_id: a.id,
                quantity: -5,
                entry_type: LedgerEntryType::Sale,
                reason: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Stock));
    assert!(err.to_string().contains("insufficient stock"));

    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 3);
    assert_eq!(store.ledger_len().await, before);
}

#[tokio::test]
async fn oversized_restock_is_rejected_and_changes_nothing() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 3).await;
    let before = store.ledger_len().await;

    let err = shop
        .inventory
        .adjust_stock(
            &admin(),
            StockAdjustment {
                product_id: a.id,
                quantity: i64::MAX,
                entry_type: LedgerEntryType::Restock,
                reason: "delivery".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Validation));

    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 3);
    assert_eq!(store.ledger_len().await, before);
}

#[tokio::test]
async fn oversized_prices_and_quantities_are_rejected() {
    let (shop, _) = storefront(PricingPolicy::default());
    let err = shop
        .inventory
        .create_product(
            &admin(),
            NewProduct {
                sku: "HUGE".to_string(),
                name: "Huge".to_string(),
                price: Money::from_cents(i64::MAX / 2),
                sale_price: None,
                initial_stock: 10,
                is_active: true,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Validation));

    let a = product(&shop, "A", 1000, 5).await;
    let user = UserId::new();
    let err = shop.carts.add_item(user, a.id, u32::MAX).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Validation));
    assert!(shop.carts.get_cart(user).await.unwrap().lines.is_empty());
}

#[tokio::test]
async fn customers_cannot_adjust_stock() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 3).await;
    let err = shop
        .inventory
        .adjust_stock(
            &Actor::customer(UserId::new()),
            StockAdjustment {
                product_id: a.id,
                quantity: 5,
                entry_type: LedgerEntryType::Restock,
                reason: "delivery".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Authorization));
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let (shop, _) = storefront(PricingPolicy::default());
    let err = shop
        .orders
        .create_order(UserId::new(), request())
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn cancellation_restores_stock_once() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let b = product(&shop, "B", 500, 2).await;
    let user = UserId::new();
    shop.carts.add_item(user, a.id, 3).await.unwrap();
    shop.carts.add_item(user, b.id, 2).await.unwrap();
    let order = shop.orders.create_order(user, request()).await.unwrap();
    assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock_quantity, 0);

    let cancelled = shop
        .orders
        .cancel_order(&Actor::customer(user), order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 5);
    assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock_quantity, 2);
    let ledger_after_cancel = store.ledger_len().await;

    let err = shop
        .orders
        .cancel_order(&Actor::customer(user), order.id)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::StateTransition));
    assert_eq!(store.ledger_len().await, ledger_after_cancel);
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 5);

    for id in [a.id, b.id] {
        let audit = shop.inventory.audit_stock(id).await.unwrap();
        assert!(audit.is_consistent());
        let returns = shop
            .inventory
            .ledger(LedgerQuery::for_product(id).entry_types(vec![LedgerEntryType::Return]))
            .await
            .unwrap();
        assert_eq!(returns.len(), 1);
    }
}

#[tokio::test]
async fn only_the_owner_or_an_admin_may_cancel() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let user = UserId::new();
    shop.carts.add_item(user, a.id, 1).await.unwrap();
    let order = shop.orders.create_order(user, request()).await.unwrap();

    let err = shop
        .orders
        .cancel_order(&Actor::customer(UserId::new()), order.id)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Authorization));

    let err = shop
        .orders
        .get_order(&Actor::customer(UserId::new()), order.id)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Authorization));
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled_by_customers() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let user = UserId::new();
    let admin = admin();
    shop.carts.add_item(user, a.id, 1).await.unwrap();
    let order = shop.orders.create_order(user, request()).await.unwrap();

    shop.orders
        .update_status(&admin, order.id, OrderStatus::Processing)
        .await
        .unwrap();
    let shipped = shop
        .orders
        .update_status(&admin, order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let err = shop
        .orders
        .cancel_order(&Actor::customer(user), order.id)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::StateTransition));

    let err = shop
        .orders
        .update_status(&admin, order.id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::StateTransition));
}

#[tokio::test]
async fn admin_cancellation_restocks() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let user = UserId::new();
    shop.carts.add_item(user, a.id, 4).await.unwrap();
    let order = shop.orders.create_order(user, request()).await.unwrap();

    shop.orders
        .update_status(&admin(), order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 5);
}

#[tokio::test]
async fn payment_status_is_admin_only_and_refund_requires_payment() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let user = UserId::new();
    shop.carts.add_item(user, a.id, 1).await.unwrap();
    let order = shop.orders.create_order(user, request()).await.unwrap();

    let err = shop
        .orders
        .update_payment_status(&Actor::customer(user), order.id, PaymentStatus::Paid)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Authorization));

    let err = shop
        .orders
        .update_payment_status(&admin(), order.id, PaymentStatus::Refunded)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::StateTransition));

    let paid = shop
        .orders
        .update_payment_status(&admin(), order.id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.status, OrderStatus::Pending);
}

#[tokio::test]
async fn customers_only_list_their_own_orders() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 10).await;
    let alice = UserId::new();
    let bob = UserId::new();
    for user in [alice, bob, alice] {
        shop.carts.add_item(user, a.id, 1).await.unwrap();
        shop.orders.create_order(user, request()).await.unwrap();
    }

    let mine = shop
        .orders
        .list_orders(&Actor::customer(alice), OrderQuery::new())
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|o| o.user_id == alice));

    let sneaky = shop
        .orders
        .list_orders(&Actor::customer(alice), OrderQuery::for_user(bob))
        .await
        .unwrap();
    assert!(sneaky.iter().all(|o| o.user_id == alice));

    let all = shop
        .orders
        .list_orders(&admin(), OrderQuery::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_redeem_a_single_use_coupon_once() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 100).await;
    coupon(&shop, "LAST", DiscountRule::Percentage(10), Some(1)).await;

    let users: Vec<UserId> = (0..8).map(|_| UserId::new()).collect();
    for user in &users {
        shop.carts.add_item(*user, a.id, 1).await.unwrap();
        shop.carts.apply_coupon(*user, "LAST").await.unwrap();
    }

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let shop = shop.clone();
            let user = *user;
            tokio::spawn(async move { shop.orders.create_order(user, request()).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                succeeded += 1;
                assert_eq!(order.discount, Money::from_cents(100));
            }
            Err(err) => {
                assert_eq!(kind(&err), Some(ErrorKind::Coupon));
                assert!(err.to_string().contains("usage limit reached"));
            }
        }
    }
    assert_eq!(succeeded, 1);

    let stored = store.get_coupon_by_code("LAST").await.unwrap().unwrap();
    assert_eq!(stored.used_count, 1);
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 99);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 3).await;

    let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();
    for user in &users {
        shop.carts.add_item(*user, a.id, 1).await.unwrap();
    }

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let shop = shop.clone();
            let user = *user;
            tokio::spawn(async move { shop.orders.create_order(user, request()).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert_eq!(kind(&err), Some(ErrorKind::Stock)),
        }
    }
    assert_eq!(succeeded, 3);

    let stored = store.get_product(a.id).await.unwrap().unwrap();
    assert_eq!(stored.stock_quantity, 0);
    let entries = shop
        .inventory
        .ledger(LedgerQuery::for_product(a.id))
        .await
        .unwrap();
    assert_eq!(replay(&entries), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_day_orders_get_unique_numbers() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 100).await;

    let users: Vec<UserId> = (0..20).map(|_| UserId::new()).collect();
    for user in &users {
        shop.carts.add_item(*user, a.id, 1).await.unwrap();
    }
    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let shop = shop.clone();
            let user = *user;
            tokio::spawn(async move { shop.orders.create_order(user, request()).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        assert!(order.order_number.as_str().starts_with("ORD"));
        assert!(numbers.insert(order.order_number.as_str().to_string()));
    }
    assert_eq!(numbers.len(), 20);
}

#[tokio::test]
async fn guest_cart_merge_reports_each_line() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let b = product(&shop, "B", 1000, 1).await;
    let user = UserId::new();

    let report = shop
        .carts
        .merge_guest_cart(
            user,
            &[
                GuestCartItem {
                    product_id: a.id,
                    quantity: 2,
                },
                GuestCartItem {
                    product_id: ProductId::new(),
                    quantity: 1,
                },
                GuestCartItem {
                    product_id: b.id,
                    quantity: 3,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].kind, ErrorKind::NotFound);
    assert_eq!(report.failed[1].index, 2);
    assert_eq!(report.failed[1].kind, ErrorKind::Stock);

    let cart = shop.carts.get_cart(user).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].quantity, 2);
}

#[tokio::test]
async fn cart_validation_lists_every_problem() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let b = product(&shop, "B", 1000, 5).await;
    let user = UserId::new();
    shop.carts.add_item(user, a.id, 5).await.unwrap();
    shop.carts.add_item(user, b.id, 1).await.unwrap();
    assert!(shop.carts.validate_for_checkout(user).await.unwrap().is_empty());

    shop.inventory
        .adjust_stock(
            &admin(),
            StockAdjustment {
                product_id: a.id,
                quantity: -2,
                entry_type: LedgerEntryType::Damaged,
                reason: "dropped".to_string(),
            },
        )
        .await
        .unwrap();
    shop.inventory
        .update_product(
            &admin(),
            b.id,
            domain::ProductUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let problems = shop.carts.validate_for_checkout(user).await.unwrap();
    assert_eq!(problems.len(), 2);

    let err = shop.orders.create_order(user, request()).await.unwrap_err();
    assert!(matches!(kind(&err), Some(ErrorKind::Stock)));
}

#[tokio::test]
async fn bulk_adjustments_are_independent() {
    let (shop, store) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    let b = product(&shop, "B", 1000, 1).await;

    let report = shop
        .inventory
        .bulk_adjust_stock(
            &admin(),
            vec![
                StockAdjustment {
                    product_id: a.id,
                    quantity: 10,
                    entry_type: LedgerEntryType::Restock,
                    reason: "delivery".to_string(),
                },
                StockAdjustment {
                    product_id: b.id,
                    quantity: -4,
                    entry_type: LedgerEntryType::Damaged,
                    reason: "flood".to_string(),
                },
                StockAdjustment {
                    product_id: b.id,
                    quantity: 3,
                    entry_type: LedgerEntryType::Sale,
                    reason: "wrong sign".to_string(),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.failed[0].kind, ErrorKind::Stock);
    assert_eq!(report.failed[1].kind, ErrorKind::Validation);
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 15);
    assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock_quantity, 1);
}

#[tokio::test]
async fn reconciliation_writes_adjustments_and_keeps_the_ledger_replayable() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 10).await;
    let b = product(&shop, "B", 1000, 4).await;

    let report = shop
        .inventory
        .reconcile(
            &admin(),
            vec![
                PhysicalCount {
                    product_id: a.id,
                    actual_quantity: 7,
                },
                PhysicalCount {
                    product_id: b.id,
                    actual_quantity: 4,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.products_checked, 2);
    assert_eq!(report.discrepancies.len(), 1);
    assert_eq!(report.discrepancies[0].difference, -3);

    let audit = shop.inventory.audit_stock(a.id).await.unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.recorded_quantity, 7);

    let summary = shop
        .inventory
        .movement_summary(LedgerQuery::for_product(a.id))
        .await
        .unwrap();
    assert_eq!(summary.net_change, 7);
    assert_eq!(summary.totals[&LedgerEntryType::Adjustment], -3);

    let low = shop.inventory.low_stock_report(5).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, b.id);

    let err = shop
        .inventory
        .reconcile(&admin(), Vec::new())
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn duplicate_codes_and_skus_conflict() {
    let (shop, _) = storefront(PricingPolicy::default());
    product(&shop, "A", 1000, 1).await;
    let err = shop
        .inventory
        .create_product(
            &admin(),
            NewProduct {
                sku: "a".to_string(),
                name: "Another".to_string(),
                price: Money::from_cents(1),
                sale_price: None,
                initial_stock: 0,
                is_active: true,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Conflict));

    coupon(&shop, "DUP", DiscountRule::FreeShipping, None).await;
    let now = Utc::now();
    let err = shop
        .coupons
        .create(
            &admin(),
            NewCoupon {
                code: " dup ".to_string(),
                rule: DiscountRule::FreeShipping,
                min_purchase: None,
                max_discount: None,
                usage_limit: None,
                per_user_limit: None,
                valid_from: now,
                valid_until: now + chrono::Duration::days(1),
                is_active: true,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Conflict));
}

#[tokio::test]
async fn deactivated_coupons_cannot_be_applied() {
    let (shop, _) = storefront(PricingPolicy::default());
    let a = product(&shop, "A", 1000, 5).await;
    coupon(&shop, "GONE", DiscountRule::Percentage(20), None).await;
    let coupon = shop.coupons.deactivate(&admin(), "gone").await.unwrap();
    assert!(!coupon.is_active);

    let user = UserId::new();
    shop.carts.add_item(user, a.id, 1).await.unwrap();
    let err = shop.carts.apply_coupon(user, "GONE").await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Coupon));
}
