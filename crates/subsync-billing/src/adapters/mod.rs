pub mod http;

pub use http::{DEFAULT_API_KEY_HEADER, HttpPaymentProvider, HttpProviderConfig};
