//! Coupon service: validation previews and administration.

use chrono::Utc;
use common::{Money, UserId};
use domain::{
    Actor, Coupon, CouponRejection, CouponUsage, CouponValidation, DomainError, NewCoupon,
};
use store::{Store, StoreError};

use crate::error::Result;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct CouponService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> CouponService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    async fn by_code(&self, code: &str) -> Result<Coupon> {
        let code = Coupon::normalize_code(code);
        self.store
            .get_coupon_by_code(&code)
            .await?
            .ok_or_else(|| DomainError::not_found("Coupon", code).into())
    }

    /// Checks whether `user_id` could use the coupon on an order of
    /// `order_total` right now. Read-only; a rejection is a normal result.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: UserId,
        order_total: Money,
    ) -> Result<CouponValidation> {
        let coupon = self
            .store
            .get_coupon_by_code(&Coupon::normalize_code(code))
            .await?;
        let Some(coupon) = coupon else {
            return Ok(CouponValidation::rejected(&CouponRejection::NotFound));
        };
        let uses = self.store.count_coupon_usages(coupon.id, user_id).await?;

        Ok(match coupon.evaluate(Utc::now(), order_total, uses) {
            Ok(discount) => CouponValidation::accepted(&coupon, discount),
            Err(rejection) => CouponValidation::rejected(&rejection),
        })
    }

    #[tracing::instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, actor: &Actor, input: NewCoupon) -> Result<Coupon> {
        actor.require_admin()?;
        let coupon = input.into_coupon(Utc::now())?;
        match self.store.insert_coupon(&coupon).await {
            Ok(()) => {
                tracing::info!(code = %coupon.code, coupon_id = %coupon.id, "coupon created");
                Ok(coupon)
            }
            Err(StoreError::UniqueViolation { .. }) => Err(DomainError::Conflict(format!(
                "coupon code {} already exists",
                coupon.code
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_inactive(&self, code: &str) -> Result<Coupon> {
        let mut coupon = self.by_code(code).await?;
        if !coupon.is_active {
            return Ok(coupon);
        }
        let expected = coupon.version;
        coupon.is_active = false;
        Ok(self.store.update_coupon(&coupon, expected).await?)
    }

    /// Stops the coupon from being applied. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, actor: &Actor, code: &str) -> Result<Coupon> {
        actor.require_admin()?;
        self.retry
            .run("coupon.deactivate", move || self.set_inactive(code))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, actor: &Actor, code: &str) -> Result<Coupon> {
        actor.require_admin()?;
        self.by_code(code).await
    }

    /// Every recorded redemption of the coupon, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn usages(&self, actor: &Actor, code: &str) -> Result<Vec<CouponUsage>> {
        actor.require_admin()?;
        let coupon = self.by_code(code).await?;
        Ok(self.store.coupon_usages(coupon.id).await?)
    }
}
