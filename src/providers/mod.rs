pub mod gocardless;
pub mod plaid;
pub mod stripe;
pub mod teller;
pub mod util;

pub use gocardless::GoCardlessProvider;
pub use plaid::PlaidProvider;
pub use stripe::StripeProvider;
pub use teller::TellerProvider;
