//! Order service: the checkout orchestrator and the order lifecycle.

use std::time::Instant;

use chrono::Utc;
use common::{OrderId, UserId};
use domain::{
    Actor, CheckoutInput, CheckoutRequest, DomainError, Order, OrderStatus, PaymentStatus,
    PricingPolicy, plan_checkout,
};
use store::{OrderQuery, Store};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Service for placing and managing orders.
///
/// Checkout reads the cart, products and coupon, plans the order with the
/// pure domain rules, and hands the plan to the store, which re-checks it
/// and commits everything in one transaction. A plan that went stale in
/// between is re-planned from a fresh read.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
    policy: PricingPolicy,
    retry: RetryPolicy,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, policy: PricingPolicy, retry: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            retry,
        }
    }

    pub fn pricing_policy(&self) -> &PricingPolicy {
        &self.policy
    }

    async fn try_checkout(&self, user_id: UserId, request: &CheckoutRequest) -> Result<Order> {
        let now = Utc::now();
        let cart = self.store.get_or_create_cart(user_id, now).await?;
        if cart.is_empty() {
            return Err(DomainError::CartEmpty.into());
        }
        let products = self.store.get_products(&cart.product_ids()).await?;
        let coupon = match cart.coupon_id {
            Some(coupon_id) => self.store.get_coupon(coupon_id).await?,
            None => None,
        };
        let coupon_uses_by_user = match &coupon {
            Some(coupon) => self.store.count_coupon_usages(coupon.id, user_id).await?,
            None => 0,
        };

        let plan = plan_checkout(
            CheckoutInput {
                user_id,
                cart: &cart,
                products: &products,
                coupon: coupon.as_ref(),
                coupon_uses_by_user,
                policy: &self.policy,
                now,
            },
            request,
        )?;
        Ok(self.store.commit_checkout(&plan).await?)
    }

    /// Turns the user's cart into an order, atomically.
    #[tracing::instrument(skip(self, request), fields(payment_method = %request.payment_method.as_str()))]
    pub async fn create_order(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let start = Instant::now();
        let request = &request;
        let result = self
            .retry
            .run("checkout", move || self.try_checkout(user_id, request))
            .await;
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                if order.coupon_id.is_some() {
                    metrics::counter!("coupon_redemptions_total").increment(1);
                }
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    items = order.items.len(),
                    total = %order.total,
                    "order created"
                );
            }
            Err(err) => {
                let kind = err.kind().map_or("internal", |k| k.as_str());
                metrics::counter!("checkout_failures_total", "kind" => kind).increment(1);
                tracing::warn!(%user_id, kind, error = %err, "checkout failed");
            }
        }
        result
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id).into())
    }

    async fn try_cancel(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        let change = order.plan_cancellation(actor, Utc::now())?;
        Ok(self.store.commit_status_change(&change).await?)
    }

    /// Cancels the order and returns its items to stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self
            .retry
            .run("order.cancel", move || self.try_cancel(actor, order_id))
            .await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, order_number = %order.order_number, "order cancelled");
        Ok(order)
    }

    async fn try_update_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        let change = order.plan_status_change(actor, status, Utc::now())?;
        Ok(self.store.commit_status_change(&change).await?)
    }

    /// Administrative status change; moving to CANCELLED restocks like a
    /// customer cancellation.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let order = self
            .retry
            .run("order.update_status", move || {
                self.try_update_status(actor, order_id, status)
            })
            .await?;
        if order.status == OrderStatus::Cancelled {
            metrics::counter!("orders_cancelled_total").increment(1);
        }
        tracing::info!(%order_id, status = %order.status, "order status updated");
        Ok(order)
    }

    async fn try_update_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        let next = order.plan_payment_status_change(actor, status)?;
        Ok(self
            .store
            .update_payment_status(order.id, order.payment_status, next, Utc::now())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order> {
        self.retry
            .run("order.update_payment", move || {
                self.try_update_payment(actor, order_id, status)
            })
            .await
    }

    /// Returns the order if the actor owns it or is an admin.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        actor.require_owner_or_admin(order.user_id)?;
        Ok(order)
    }

    /// Lists orders newest first. Customers only ever see their own.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, actor: &Actor, mut query: OrderQuery) -> Result<Vec<Order>> {
        if !actor.is_admin() {
            query.user_id = Some(actor.user_id);
        }
        Ok(self.store.list_orders(query).await?)
    }
}
