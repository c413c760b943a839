//! Orders: pricing, checkout planning and the status state machines.

mod aggregate;
mod checkout;
mod pricing;
mod state;
mod value_objects;

pub use aggregate::{Order, StatusChange};
pub use checkout::{
    CheckoutInput, CheckoutPlan, CheckoutRequest, MAX_NOTES_LEN, PlannedLine, PlannedRedemption,
    plan_checkout,
};
pub use pricing::{OrderTotals, PricingPolicy};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{OrderItem, OrderNumber, PaymentMethod, ShippingAddress};
