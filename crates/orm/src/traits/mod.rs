//! Capability bundles attached to compiled models through their trait flags

pub(crate) mod association;
pub mod billable;
pub mod categorizable;
pub mod commentable;
pub mod likeable;
pub mod taggable;
pub mod two_factor;

pub use billable::{
    Billable, CheckoutLineItem, CheckoutOptions, CheckoutRequest, CheckoutSession, Customer,
    CustomerParams, PaymentIntent, PaymentMethod, PaymentsError, PaymentsProvider, SetupIntent,
    Subscription, SubscriptionRequest, SubscriptionStatus,
};
pub use categorizable::{Categorizable, Category, NewCategory};
pub use commentable::{Comment, CommentStatus, Commentable, NewComment};
pub use likeable::{Like, Likeable};
pub use taggable::{NewTag, Tag, Taggable};
pub use two_factor::{AuthError, TwoFactor, TwoFactorProvider};
