pub mod audit;
pub mod metrics;
pub mod pesapal;
pub mod repository;
pub mod token;

pub use metrics::{get_metrics, init_metrics};
pub use pesapal::PesapalClient;
pub use repository::{MongoOrderStore, MongoPaymentStore, OrderStore, PaymentStore};
pub use token::{CachedTokenProvider, TokenProvider};
