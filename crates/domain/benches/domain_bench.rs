use std::collections::HashMap;

use chrono::{Duration, Utc};
use common::{Money, ProductId, UserId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{
    Cart, CartView, CheckoutInput, CheckoutRequest, Coupon, DiscountRule, NewCoupon, NewProduct,
    PaymentMethod, PricingPolicy, Product, ShippingAddress, plan_checkout,
};

fn catalog(size: usize) -> HashMap<ProductId, Product> {
    (0..size)
        .map(|i| {
            let (product, _) = NewProduct {
                sku: format!("SKU-{i:04}"),
                name: format!("Product {i}"),
                price: Money::from_cents(1000 + i as i64),
                sale_price: None,
                initial_stock: 1_000,
                is_active: true,
            }
            .into_product(Utc::now())
            .unwrap();
            (product.id, product)
        })
        .collect()
}

fn coupon() -> Coupon {
    let now = Utc::now();
    NewCoupon {
        code: "BENCH10".to_string(),
        rule: DiscountRule::Percentage(10),
        min_purchase: None,
        max_discount: Some(Money::from_cents(5000)),
        usage_limit: None,
        per_user_limit: None,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(1),
        is_active: true,
    }
    .into_coupon(now)
    .unwrap()
}

fn filled_cart(products: &HashMap<ProductId, Product>, coupon: &Coupon) -> Cart {
    let mut cart = Cart::new(UserId::new(), Utc::now());
    for product in products.values() {
        cart.add_item(product, 2, Utc::now()).unwrap();
    }
    cart.attach_coupon(coupon.id, Utc::now());
    cart
}

fn request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: ShippingAddress {
            street: "1 Bench Way".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        },
        payment_method: PaymentMethod::CreditCard,
        notes: None,
    }
}

fn bench_cart_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("domain/cart_summary");
    let coupon = coupon();
    for size in [1usize, 10, 100] {
        let products = catalog(size);
        let cart = filled_cart(&products, &coupon);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let view = CartView {
                    cart: &cart,
                    products: &products,
                    coupon: Some(&coupon),
                    coupon_uses_by_user: 0,
                };
                view.summarize(Utc::now())
            });
        });
    }
    group.finish();
}

fn bench_plan_checkout(c: &mut Criterion) {
    let mut group = c.benchmark_group("domain/plan_checkout");
    let coupon = coupon();
    let policy = PricingPolicy::default();
    let request = request();
    for size in [1usize, 10, 100] {
        let products = catalog(size);
        let cart = filled_cart(&products, &coupon);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                plan_checkout(
                    CheckoutInput {
                        user_id: cart.user_id,
                        cart: &cart,
                        products: &products,
                        coupon: Some(&coupon),
                        coupon_uses_by_user: 0,
                        policy: &policy,
                        now: Utc::now(),
                    },
                    &request,
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cart_summary, bench_plan_checkout);
criterion_main!(benches);
