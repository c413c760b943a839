//! The per-user shopping cart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, CouponId, Money, ProductId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::coupon::Coupon;
use crate::error::{CouponRejection, DomainError};
use crate::product::Product;

/// Most units of one product a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// A product line in a cart. At most one line exists per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// A user's cart. Created lazily, never deleted, emptied by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub coupon_id: Option<CouponId>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            coupon_id: None,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|i| i.product_id).collect()
    }

    /// Adds `quantity` units of `product`, merging into an existing line.
    ///
    /// The combined quantity is checked against current stock.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        ensure_quantity(quantity)?;

        let position = self.items.iter().position(|i| i.product_id == product.id);
        let combined = match position {
            Some(idx) => self.items[idx]
                .quantity
                .checked_add(quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| {
                    DomainError::validation(
                        "quantity",
                        format!("must not exceed {MAX_LINE_QUANTITY} per line"),
                    )
                })?,
            None => quantity,
        };
        product.ensure_available(combined)?;

        let item = match position {
            Some(idx) => {
                self.items[idx].quantity = combined;
                self.items[idx].clone()
            }
            None => {
                let item = CartItem {
                    id: CartItemId::new(),
                    product_id: product.id,
                    quantity,
                    added_at: now,
                };
                self.items.push(item.clone());
                item
            }
        };
        self.updated_at = now;
        Ok(item)
    }

    /// Replaces a line's quantity. `product` must be the line's product.
    pub fn update_item_quantity(
        &mut self,
        item_id: CartItemId,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        ensure_quantity(quantity)?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| DomainError::not_found("CartItem", item_id))?;
        if item.product_id != product.id {
            return Err(DomainError::validation(
                "product_id",
                "does not match the cart item",
            ));
        }
        product.ensure_available(quantity)?;
        item.quantity = quantity;
        let updated = item.clone();
        self.updated_at = now;
        Ok(updated)
    }

    pub fn remove_item(
        &mut self,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| DomainError::not_found("CartItem", item_id))?;
        self.updated_at = now;
        Ok(self.items.remove(idx))
    }

    /// Removes every line and detaches the coupon.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.coupon_id = None;
        self.updated_at = now;
    }

    pub fn attach_coupon(&mut self, coupon_id: CouponId, now: DateTime<Utc>) {
        self.coupon_id = Some(coupon_id);
        self.updated_at = now;
    }

    pub fn detach_coupon(&mut self, now: DateTime<Utc>) {
        self.coupon_id = None;
        self.updated_at = now;
    }
}

fn ensure_quantity(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity", "must be at least 1"));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(DomainError::validation(
            "quantity",
            format!("must not exceed {MAX_LINE_QUANTITY} per line"),
        ));
    }
    Ok(())
}

/// A line of a guest cart being merged into a user's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub is_active: bool,
    pub available_stock: i64,
}

/// Cart totals preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
    pub coupon_code: Option<String>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub free_shipping: bool,
    pub problems: Vec<CheckoutProblem>,
}

/// Something that would make checkout fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum CheckoutProblem {
    EmptyCart,
    ProductMissing {
        product_id: ProductId,
    },
    ProductInactive {
        product_id: ProductId,
        product_name: String,
    },
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: i64,
        requested: u32,
    },
    CouponInvalid {
        code: Option<String>,
        reason: CouponRejection,
    },
}

impl std::fmt::Display for CheckoutProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutProblem::EmptyCart => f.write_str("cart is empty"),
            CheckoutProblem::ProductMissing { product_id } => {
                write!(f, "product {product_id} no longer exists")
            }
            CheckoutProblem::ProductInactive { product_name, .. } => {
                write!(f, "{product_name} is no longer available")
            }
            CheckoutProblem::InsufficientStock {
                product_name,
                available,
                requested,
                ..
            } => write!(
                f,
                "insufficient stock for {product_name}: {available} available, {requested} requested"
            ),
            CheckoutProblem::CouponInvalid { code, reason } => match code {
                Some(code) => write!(f, "coupon {code}: {reason}"),
                None => write!(f, "coupon: {reason}"),
            },
        }
    }
}

/// Read-only view of a cart joined with its products and attached coupon.
pub struct CartView<'a> {
    pub cart: &'a Cart,
    pub products: &'a HashMap<ProductId, Product>,
    pub coupon: Option<&'a Coupon>,
    /// How many times the cart owner has already redeemed the attached coupon.
    pub coupon_uses_by_user: u32,
}

impl<'a> CartView<'a> {
    pub fn lines(&self) -> Vec<CartLine> {
        self.cart
            .items
            .iter()
            .filter_map(|item| {
                let product = self.products.get(&item.product_id)?;
                let unit_price = product.unit_price();
                Some(CartLine {
                    item_id: item.id,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    unit_price,
                    quantity: item.quantity,
                    line_total: unit_price.multiply(item.quantity),
                    is_active: product.is_active,
                    available_stock: product.stock_quantity,
                })
            })
            .collect()
    }

    pub fn subtotal(&self) -> Money {
        self.lines().iter().map(|l| l.line_total).sum()
    }

    fn coupon_outcome(&self, subtotal: Money, now: DateTime<Utc>) -> Option<Result<Money, CouponRejection>> {
        self.cart.coupon_id?;
        Some(match self.coupon {
            Some(coupon) => coupon.evaluate(now, subtotal, self.coupon_uses_by_user),
            None => Err(CouponRejection::NotFound),
        })
    }

    /// Totals preview. An attached coupon that no longer applies discounts nothing.
    pub fn summarize(&self, now: DateTime<Utc>) -> CartSummary {
        let lines = self.lines();
        let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
        let (discount, free_shipping) = match self.coupon_outcome(subtotal, now) {
            Some(Ok(discount)) => (
                discount,
                self.coupon.is_some_and(Coupon::is_free_shipping),
            ),
            _ => (Money::zero(), false),
        };
        CartSummary {
            cart_id: self.cart.id,
            lines,
            coupon_code: self.coupon.map(|c| c.code.clone()),
            subtotal,
            discount,
            total: subtotal.saturating_sub(discount),
            free_shipping,
            problems: self.validate_for_checkout(now),
        }
    }

    /// Every reason checkout would currently fail. Empty means ready.
    pub fn validate_for_checkout(&self, now: DateTime<Utc>) -> Vec<CheckoutProblem> {
        let mut problems = Vec::new();
        if self.cart.is_empty() {
            problems.push(CheckoutProblem::EmptyCart);
        }
        for item in &self.cart.items {
            let Some(product) = self.products.get(&item.product_id) else {
                problems.push(CheckoutProblem::ProductMissing {
                    product_id: item.product_id,
                });
                continue;
            };
            if !product.is_active {
                problems.push(CheckoutProblem::ProductInactive {
                    product_id: product.id,
                    product_name: product.name.clone(),
                });
            } else if product.stock_quantity < i64::from(item.quantity) {
                problems.push(CheckoutProblem::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    available: product.stock_quantity,
                    requested: item.quantity,
                });
            }
        }
        if let Some(Err(reason)) = self.coupon_outcome(self.subtotal(), now) {
            problems.push(CheckoutProblem::CouponInvalid {
                code: self.coupon.map(|c| c.code.clone()),
                reason,
            });
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{DiscountRule, NewCoupon};
    use crate::product::NewProduct;
    use crate::ErrorKind;
    use chrono::Duration;

    fn product(price: i64, stock: i64) -> Product {
        NewProduct {
            sku: format!("SKU-{price}-{stock}"),
            name: "Widget".to_string(),
            price: Money::from_cents(price),
            sale_price: None,
            initial_stock: stock,
            is_active: true,
        }
        .into_product(Utc::now())
        .unwrap()
        .0
    }

    fn catalog(products: &[&Product]) -> HashMap<ProductId, Product> {
        products.iter().map(|p| (p.id, (*p).clone())).collect()
    }

    #[test]
    fn add_merges_and_rechecks_combined_quantity() {
        let p = product(1000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&p, 3, Utc::now()).unwrap();
        cart.add_item(&p, 2, Utc::now()).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);

        let err = cart.add_item(&p, 1, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stock);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[test]
    fn line_quantity_is_capped() {
        let p = product(1000, i64::from(MAX_LINE_QUANTITY) * 2);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let err = cart.add_item(&p, u32::MAX, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(cart.is_empty());

        cart.add_item(&p, MAX_LINE_QUANTITY, Utc::now()).unwrap();
        let err = cart.add_item(&p, 1, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(cart.items[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn inactive_products_cannot_be_added() {
        let mut p = product(1000, 5);
        p.is_active = false;
        let mut cart = Cart::new(UserId::new(), Utc::now());
        assert!(cart.add_item(&p, 1, Utc::now()).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let p = product(1000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let err = cart.add_item(&p, 0, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn update_and_remove() {
        let p = product(1000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let item = cart.add_item(&p, 1, Utc::now()).unwrap();
        cart.update_item_quantity(item.id, &p, 4, Utc::now()).unwrap();
        assert_eq!(cart.item(item.id).unwrap().quantity, 4);
        assert!(cart.update_item_quantity(item.id, &p, 6, Utc::now()).is_err());

        cart.remove_item(item.id, Utc::now()).unwrap();
        assert!(cart.is_empty());
        assert_eq!(
            cart.remove_item(item.id, Utc::now()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn summary_applies_coupon_and_floors_total() {
        let p = product(1000, 5);
        let products = catalog(&[&p]);
        let now = Utc::now();
        let coupon = NewCoupon {
            code: "BIG".to_string(),
            rule: DiscountRule::FixedAmount(Money::from_cents(5000)),
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
        }
        .into_coupon(now)
        .unwrap();

        let mut cart = Cart::new(UserId::new(), now);
        cart.add_item(&p, 2, now).unwrap();
        cart.attach_coupon(coupon.id, now);

        let view = CartView {
            cart: &cart,
            products: &products,
            coupon: Some(&coupon),
            coupon_uses_by_user: 0,
        };
        let summary = view.summarize(now);
        assert_eq!(summary.subtotal, Money::from_cents(2000));
        assert_eq!(summary.discount, Money::from_cents(2000));
        assert_eq!(summary.total, Money::zero());
        assert!(summary.problems.is_empty());
    }

    #[test]
    fn validation_reports_every_problem_at_once() {
        let mut inactive = product(1000, 5);
        let low = product(500, 1);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&inactive, 1, Utc::now()).unwrap();
        cart.add_item(&low, 1, Utc::now()).unwrap();
        cart.attach_coupon(CouponId::new(), Utc::now());

        inactive.is_active = false;
        let mut sold_out = low.clone();
        sold_out.stock_quantity = 0;
        let products = catalog(&[&inactive, &sold_out]);

        let view = CartView {
            cart: &cart,
            products: &products,
            coupon: None,
            coupon_uses_by_user: 0,
        };
        let problems = view.validate_for_checkout(Utc::now());
        assert_eq!(problems.len(), 3);
        assert!(matches!(problems[0], CheckoutProblem::ProductInactive { .. }));
        assert!(matches!(problems[1], CheckoutProblem::InsufficientStock { .. }));
        assert!(matches!(
            problems[2],
            CheckoutProblem::CouponInvalid {
                reason: CouponRejection::NotFound,
                ..
            }
        ));
        assert_eq!(view.summarize(Utc::now()).discount, Money::zero());
    }

    #[test]
    fn empty_cart_is_a_problem() {
        let cart = Cart::new(UserId::new(), Utc::now());
        let products = HashMap::new();
        let view = CartView {
            cart: &cart,
            products: &products,
            coupon: None,
            coupon_uses_by_user: 0,
        };
        assert_eq!(
            view.validate_for_checkout(Utc::now()),
            vec![CheckoutProblem::EmptyCart]
        );
    }
}
