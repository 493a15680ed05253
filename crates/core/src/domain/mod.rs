//! Pure business rules shared by the API and CLI.
//!
//! Nothing in here touches the database; repositories load rows, hand them to
//! these functions, and persist the result inside a transaction.

pub mod cart;
pub mod order;
pub mod pagination;
pub mod pricing;
pub mod review;

pub use cart::{Cart, CartError, CartLine, CartSummary};
pub use order::{AddressError, OrderLine, ShippingAddress};
pub use pagination::{PageRequest, Paged};
pub use pricing::{OrderTotals, PricingError, PricingPolicy, ProductPricing};
pub use review::{Rating, RatingError, ReviewSort, SortableReview, average_rating};
