//! MQ client: exchange/queue declaration, publish/consume with manual
//! ack/nack, over an enum-dispatched transport (a real AMQP broker via
//! `lapin`, or an in-memory stand-in for tests).

pub mod client;
pub mod error;
pub mod provider;
pub mod router;

pub use client::MessageClient;
pub use error::MessagingError;
pub use provider::{Delivery, MessagingProvider};
pub use router::ExchangerRouter;
