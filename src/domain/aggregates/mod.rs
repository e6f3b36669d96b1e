//! Aggregates module
pub mod cart;
pub mod design;
pub mod order;
pub mod product;
pub mod profile;
pub mod returns;
pub mod submission;

pub use cart::{Cart, CartError, CartLine, WishlistItem};
pub use design::{Design, DesignError, DesignKind, DesignPayload};
pub use order::{
    Order, OrderAction, OrderError, OrderItem, OrderLine, OrderStatus, PaymentMethod, PaymentStatus,
    ShippingPolicy, ShippingStatus, TrackingNote, Transition,
};
pub use product::{CatalogProduct, CatalogProductInput, ProductDetails, ProductError};
pub use profile::{Profile, ProfileUpdate, Role};
pub use returns::{OrderExchange, OrderReturn, RequestStatus};
pub use submission::{SubmissionError, SubmissionStatus, SubmittedProduct};
