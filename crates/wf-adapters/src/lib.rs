//! Concrete [`wf_core::adapter::SideEffectAdapter`]s: a tracing-backed logger
//! and an HMAC-signed HTTP webhook caller.

mod logging;
mod webhook;

pub use logging::LoggingAdapter;
pub use webhook::{HttpWebhookAdapter, WebhookConfig};
