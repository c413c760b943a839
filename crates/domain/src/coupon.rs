//! Coupon eligibility and discount rules.

use chrono::{DateTime, Utc};
use common::{CouponId, Money, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::error::{CouponRejection, DomainError};

/// How a coupon reduces the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountRule {
    /// Whole percent (1–100) of the order subtotal.
    Percentage(u32),
    /// Fixed amount, never more than the subtotal.
    FixedAmount(Money),
    /// No price discount; shipping is charged at zero.
    FreeShipping,
}

impl DiscountRule {
    pub fn type_str(&self) -> &'static str {
        match self {
            DiscountRule::Percentage(_) => "PERCENTAGE",
            DiscountRule::FixedAmount(_) => "FIXED_AMOUNT",
            DiscountRule::FreeShipping => "FREE_SHIPPING",
        }
    }

    /// Raw value as stored: percent, cents, or zero.
    pub fn raw_value(&self) -> i64 {
        match self {
            DiscountRule::Percentage(percent) => i64::from(*percent),
            DiscountRule::FixedAmount(amount) => amount.cents(),
            DiscountRule::FreeShipping => 0,
        }
    }

    /// Rebuilds a rule from its stored type and value.
    pub fn from_parts(discount_type: &str, value: i64) -> Result<Self, DomainError> {
        let rule = match discount_type {
            "PERCENTAGE" => DiscountRule::Percentage(u32::try_from(value).map_err(|_| {
                DomainError::validation("discount_value", "percentage out of range")
            })?),
            "FIXED_AMOUNT" => DiscountRule::FixedAmount(Money::from_cents(value)),
            "FREE_SHIPPING" => DiscountRule::FreeShipping,
            other => {
                return Err(DomainError::validation(
                    "discount_type",
                    format!("unknown discount type '{other}'"),
                ));
            }
        };
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self {
            DiscountRule::Percentage(percent) if !(1..=100).contains(percent) => Err(
                DomainError::validation("discount_value", "percentage must be between 1 and 100"),
            ),
            DiscountRule::FixedAmount(amount) if !amount.is_positive() => Err(
                DomainError::validation("discount_value", "fixed amount must be greater than 0"),
            ),
            _ => Ok(()),
        }
    }
}

/// A named discount rule with eligibility constraints and usage accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub rule: DiscountRule,
    pub min_purchase: Option<Money>,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub per_user_limit: Option<u32>,
    pub used_count: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    /// Bumped by administrative edits only; redemptions leave it alone.
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Canonical form of a coupon code.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn is_free_shipping(&self) -> bool {
        matches!(self.rule, DiscountRule::FreeShipping)
    }

    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    /// Checks every eligibility rule, in a fixed order, failing on the first miss.
    pub fn check_eligibility(
        &self,
        now: DateTime<Utc>,
        order_total: Money,
        uses_by_user: u32,
    ) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.valid_from {
            return Err(CouponRejection::NotYetValid);
        }
        if now > self.valid_until {
            return Err(CouponRejection::Expired);
        }
        if !self.has_remaining_uses() {
            return Err(CouponRejection::UsageLimitReached);
        }
        if let Some(minimum) = self.min_purchase
            && order_total < minimum
        {
            return Err(CouponRejection::MinimumPurchaseNotMet { minimum });
        }
        if let Some(limit) = self.per_user_limit
            && uses_by_user >= limit
        {
            return Err(CouponRejection::PerUserLimitReached);
        }
        Ok(())
    }

    /// Discount granted on `order_total`, ignoring eligibility.
    pub fn discount_for(&self, order_total: Money) -> Money {
        let order_total = order_total.max(Money::zero());
        match self.rule {
            DiscountRule::Percentage(percent) => {
                let discount = order_total.percent(percent);
                match self.max_discount {
                    Some(cap) if discount > cap => cap,
                    _ => discount,
                }
            }
            DiscountRule::FixedAmount(amount) => amount.min(order_total),
            DiscountRule::FreeShipping => Money::zero(),
        }
    }

    /// Eligibility check followed by the discount computation.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        order_total: Money,
        uses_by_user: u32,
    ) -> Result<Money, CouponRejection> {
        self.check_eligibility(now, order_total, uses_by_user)?;
        Ok(self.discount_for(order_total))
    }
}

/// Input for creating a coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub rule: DiscountRule,
    #[serde(default)]
    pub min_purchase: Option<Money>,
    #[serde(default)]
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub per_user_limit: Option<u32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewCoupon {
    pub fn into_coupon(self, now: DateTime<Utc>) -> Result<Coupon, DomainError> {
        let code = Coupon::normalize_code(&self.code);
        if code.is_empty() {
            return Err(DomainError::validation("code", "must not be empty"));
        }
        self.rule.validate()?;
        if self.valid_until <= self.valid_from {
            return Err(DomainError::validation(
                "valid_until",
                "must be after valid_from",
            ));
        }
        if self.usage_limit == Some(0) || self.per_user_limit == Some(0) {
            return Err(DomainError::validation(
                "usage_limit",
                "limits must be at least 1 when set",
            ));
        }
        for (field, amount) in [
            ("min_purchase", self.min_purchase),
            ("max_discount", self.max_discount),
        ] {
            if amount.is_some_and(|a| a.is_negative()) {
                return Err(DomainError::validation(field, "must not be negative"));
            }
        }

        Ok(Coupon {
            id: CouponId::new(),
            code,
            rule: self.rule,
            min_purchase: self.min_purchase,
            max_discount: self.max_discount,
            usage_limit: self.usage_limit,
            per_user_limit: self.per_user_limit,
            used_count: 0,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            is_active: self.is_active,
            version: Version::first(),
            created_at: now,
        })
    }
}

/// One redemption of a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub coupon_id: CouponId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub used_at: DateTime<Utc>,
}

/// Result of a coupon validation request; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub free_shipping: bool,
}

impl CouponValidation {
    pub fn accepted(coupon: &Coupon, discount: Money) -> Self {
        Self {
            valid: true,
            discount: Some(discount),
            message: None,
            free_shipping: coupon.is_free_shipping(),
        }
    }

    pub fn rejected(rejection: &CouponRejection) -> Self {
        Self {
            valid: false,
            discount: None,
            message: Some(rejection.to_string()),
            free_shipping: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(rule: DiscountRule) -> Coupon {
        let now = Utc::now();
        NewCoupon {
            code: " save10 ".to_string(),
            rule,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
        }
        .into_coupon(now)
        .unwrap()
    }

    #[test]
    fn code_is_normalized() {
        assert_eq!(coupon(DiscountRule::Percentage(10)).code, "SAVE10");
    }

    #[test]
    fn percentage_is_capped() {
        let mut c = coupon(DiscountRule::Percentage(10));
        assert_eq!(
            c.discount_for(Money::from_cents(2000)),
            Money::from_cents(200)
        );
        c.max_discount = Some(Money::from_cents(150));
        assert_eq!(
            c.discount_for(Money::from_cents(2000)),
            Money::from_cents(150)
        );
    }

    #[test]
    fn fixed_amount_never_exceeds_total() {
        let c = coupon(DiscountRule::FixedAmount(Money::from_cents(500)));
        assert_eq!(
            c.discount_for(Money::from_cents(2000)),
            Money::from_cents(500)
        );
        assert_eq!(
            c.discount_for(Money::from_cents(300)),
            Money::from_cents(300)
        );
    }

    #[test]
    fn free_shipping_has_no_price_discount() {
        let c = coupon(DiscountRule::FreeShipping);
        assert!(c.is_free_shipping());
        assert_eq!(c.discount_for(Money::from_cents(2000)), Money::zero());
    }

    #[test]
    fn eligibility_rules() {
        let now = Utc::now();
        let total = Money::from_cents(1000);

        let mut c = coupon(DiscountRule::Percentage(10));
        c.is_active = false;
        assert_eq!(
            c.check_eligibility(now, total, 0),
            Err(CouponRejection::Inactive)
        );

        let mut c = coupon(DiscountRule::Percentage(10));
        c.valid_until = now - Duration::hours(1);
        assert_eq!(
            c.check_eligibility(now, total, 0),
            Err(CouponRejection::Expired)
        );

        let mut c = coupon(DiscountRule::Percentage(10));
        c.valid_from = now + Duration::hours(1);
        assert_eq!(
            c.check_eligibility(now, total, 0),
            Err(CouponRejection::NotYetValid)
        );

        let mut c = coupon(DiscountRule::Percentage(10));
        c.usage_limit = Some(1);
        c.used_count = 1;
        assert_eq!(
            c.check_eligibility(now, total, 0),
            Err(CouponRejection::UsageLimitReached)
        );

        let mut c = coupon(DiscountRule::Percentage(10));
        c.min_purchase = Some(Money::from_cents(5000));
        assert!(matches!(
            c.check_eligibility(now, total, 0),
            Err(CouponRejection::MinimumPurchaseNotMet { .. })
        ));

        let mut c = coupon(DiscountRule::Percentage(10));
        c.per_user_limit = Some(2);
        assert!(c.check_eligibility(now, total, 1).is_ok());
        assert_eq!(
            c.check_eligibility(now, total, 2),
            Err(CouponRejection::PerUserLimitReached)
        );
    }

    #[test]
    fn rejects_bad_definitions() {
        let now = Utc::now();
        let base = NewCoupon {
            code: "X".to_string(),
            rule: DiscountRule::Percentage(150),
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: None,
            valid_from: now,
            valid_until: now + Duration::days(1),
            is_active: true,
        };
        assert!(base.clone().into_coupon(now).is_err());

        let inverted = NewCoupon {
            rule: DiscountRule::Percentage(10),
            valid_until: now - Duration::days(1),
            ..base
        };
        assert!(inverted.into_coupon(now).is_err());
    }

    #[test]
    fn stored_parts_roundtrip() {
        let rule = DiscountRule::from_parts("FIXED_AMOUNT", 250).unwrap();
        assert_eq!(rule, DiscountRule::FixedAmount(Money::from_cents(250)));
        assert_eq!(rule.raw_value(), 250);
        assert!(DiscountRule::from_parts("BOGO", 1).is_err());
    }
}
