//! Cart service: per-user staging area ahead of checkout.

use std::collections::HashMap;

use chrono::Utc;
use common::{CartItemId, ProductId, UserId};
use domain::{
    BatchReport, Cart, CartItem, CartSummary, CartView, CheckoutProblem, Coupon, CouponRejection,
    DomainError, GuestCartItem, Product,
};
use store::Store;

use crate::error::Result;
use crate::retry::RetryPolicy;

/// A cart loaded together with everything needed to price it.
struct LoadedCart {
    cart: Cart,
    products: HashMap<ProductId, Product>,
    coupon: Option<Coupon>,
    coupon_uses_by_user: u32,
}

impl LoadedCart {
    fn view(&self) -> CartView<'_> {
        CartView {
            cart: &self.cart,
            products: &self.products,
            coupon: self.coupon.as_ref(),
            coupon_uses_by_user: self.coupon_uses_by_user,
        }
    }
}

/// Service for managing carts.
///
/// Every mutation is a read-modify-save guarded by the cart version and is
/// retried from a fresh read when a concurrent request saved first.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    async fn load(&self, user_id: UserId) -> Result<LoadedCart> {
        let cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        let products = self.store.get_products(&cart.product_ids()).await?;
        let (coupon, coupon_uses_by_user) = match cart.coupon_id {
            Some(coupon_id) => match self.store.get_coupon(coupon_id).await? {
                Some(coupon) => {
                    let uses = self.store.count_coupon_usages(coupon.id, user_id).await?;
                    (Some(coupon), uses)
                }
                None => (None, 0),
            },
            None => (None, 0),
        };
        Ok(LoadedCart {
            cart,
            products,
            coupon,
            coupon_uses_by_user,
        })
    }

    async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id).into())
    }

    /// Returns the priced cart, creating it on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartSummary> {
        let loaded = self.load(user_id).await?;
        Ok(loaded.view().summarize(Utc::now()))
    }

    /// Every reason checkout would currently fail, all at once.
    #[tracing::instrument(skip(self))]
    pub async fn validate_for_checkout(&self, user_id: UserId) -> Result<Vec<CheckoutProblem>> {
        let loaded = self.load(user_id).await?;
        Ok(loaded.view().validate_for_checkout(Utc::now()))
    }

    async fn add_line(&self, user_id: UserId, product_id: ProductId, quantity: u32) -> Result<CartItem> {
        let product = self.product(product_id).await?;
        let mut cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        let item = cart.add_item(&product, quantity, Utc::now())?;
        self.store.save_cart(&cart).await?;
        Ok(item)
    }

    /// Adds units of a product, merging with an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSummary> {
        self.retry
            .run("cart.add_item", move || {
                self.add_line(user_id, product_id, quantity)
            })
            .await?;
        self.get_cart(user_id).await
    }

    async fn set_quantity(&self, user_id: UserId, item_id: CartItemId, quantity: u32) -> Result<()> {
        let mut cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        let product_id = cart
            .item(item_id)
            .map(|item| item.product_id)
            .ok_or_else(|| DomainError::not_found("CartItem", item_id))?;
        let product = self.product(product_id).await?;
        cart.update_item_quantity(item_id, &product, quantity, Utc::now())?;
        self.store.save_cart(&cart).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartSummary> {
        self.retry
            .run("cart.update_item", move || {
                self.set_quantity(user_id, item_id, quantity)
            })
            .await?;
        self.get_cart(user_id).await
    }

    async fn drop_line(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        let mut cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        cart.remove_item(item_id, Utc::now())?;
        self.store.save_cart(&cart).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<CartSummary> {
        self.retry
            .run("cart.remove_item", move || self.drop_line(user_id, item_id))
            .await?;
        self.get_cart(user_id).await
    }

    async fn empty(&self, user_id: UserId) -> Result<()> {
        let mut cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        cart.clear(Utc::now());
        self.store.save_cart(&cart).await?;
        Ok(())
    }

    /// Removes every line and detaches the coupon.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<CartSummary> {
        self.retry
            .run("cart.clear", move || self.empty(user_id))
            .await?;
        self.get_cart(user_id).await
    }

    async fn attach(&self, user_id: UserId, code: &str) -> Result<()> {
        let mut loaded = self.load(user_id).await?;
        let coupon = self
            .store
            .get_coupon_by_code(&Coupon::normalize_code(code))
            .await?
            .ok_or(DomainError::Coupon(CouponRejection::NotFound))?;
        let uses = self.store.count_coupon_usages(coupon.id, user_id).await?;
        let subtotal = loaded.view().subtotal();
        coupon
            .evaluate(Utc::now(), subtotal, uses)
            .map_err(DomainError::from)?;

        loaded.cart.attach_coupon(coupon.id, Utc::now());
        self.store.save_cart(&loaded.cart).await?;
        Ok(())
    }

    /// Validates the coupon against the current subtotal, then attaches it.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: UserId, code: &str) -> Result<CartSummary> {
        self.retry
            .run("cart.apply_coupon", move || self.attach(user_id, code))
            .await?;
        self.get_cart(user_id).await
    }

    async fn detach(&self, user_id: UserId) -> Result<()> {
        let mut cart = self.store.get_or_create_cart(user_id, Utc::now()).await?;
        cart.detach_coupon(Utc::now());
        self.store.save_cart(&cart).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: UserId) -> Result<CartSummary> {
        self.retry
            .run("cart.remove_coupon", move || self.detach(user_id))
            .await?;
        self.get_cart(user_id).await
    }

    /// Merges a guest cart line by line. A line that cannot be added is
    /// reported and the rest still go in.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn merge_guest_cart(
        &self,
        user_id: UserId,
        items: &[GuestCartItem],
    ) -> Result<BatchReport<CartItem>> {
        let mut report = BatchReport::new();
        for (index, guest) in items.iter().enumerate() {
            let added = self
                .retry
                .run("cart.merge", move || {
                    self.add_line(user_id, guest.product_id, guest.quantity)
                })
                .await;
            match added {
                Ok(item) => report.succeeded(item),
                Err(err) => match err.kind() {
                    Some(kind) => {
                        tracing::warn!(%user_id, product_id = %guest.product_id, %kind, "guest cart line skipped");
                        report.failed(index, Some(guest.product_id), kind, err.to_string());
                    }
                    None => return Err(err),
                },
            }
        }
        Ok(report)
    }
}
