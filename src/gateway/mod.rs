//! Gateway module
//!
//! Routing of account operations to a primary/fallback backend pair and
//! reconciliation of the store that did not serve.

pub mod dispatcher;
pub mod reconciliation;
pub mod targets;

pub use dispatcher::{
    DispatchOutcome, DualTargetDispatcher, FailoverState, ForwardRequest, ProxiedBody,
    ProxiedResponse, CORRELATION_ID_HEADER, USER_ID_HEADER,
};
pub use reconciliation::{ReconciliationPublisher, SkipReason, TransactionEvent};
pub use targets::{OperationTargets, PathRewrite, ServiceTargets, Target, TargetEndpoint};
