pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod errors;
pub mod metrics_defs;
pub mod resolver;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testutils;

pub use dispatcher::{DispatchOptions, Dispatcher};
pub use errors::{DispatchError, NotifierError, ProviderError};
pub use types::{
    DeliveryReport, DeliveryResult, GroupSummary, MemberTokens, NotificationPayload,
    RecipientFields, RecipientSpec, UserRef,
};
