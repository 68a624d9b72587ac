//! Service targets
//!
//! Static per-operation routing: each operation has a primary backend
//! (document store) and a fallback backend (relational store), each with its
//! own base URL and path rewrite rule.

use reqwest::Url;
use std::fmt;

use crate::domain::{Operation, StoreKind};

/// Which backend of a pair served (or is serving) a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Primary,
    Fallback,
}

impl Target {
    /// Store whose identity namespace the target speaks
    pub fn store(&self) -> StoreKind {
        match self {
            Target::Primary => StoreKind::Document,
            Target::Fallback => StoreKind::Relational,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid rewrite rule syntax
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid path rewrite rule '{0}' (expected '/from=/to')")]
pub struct InvalidRewrite(pub String);

/// Prefix rewrite: a request path starting with `from` has that prefix
/// replaced by `to`. Paths that don't match are forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRewrite {
    from: String,
    to: String,
}

impl PathRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into().trim_end_matches('/').to_string(),
            to: to.into().trim_end_matches('/').to_string(),
        }
    }

    /// Parse `"/accounts/balance=/balance"`
    pub fn parse(rule: &str) -> Result<Self, InvalidRewrite> {
        let (from, to) = rule
            .split_once('=')
            .ok_or_else(|| InvalidRewrite(rule.to_string()))?;
        let (from, to) = (from.trim(), to.trim());

        if !from.starts_with('/') || !(to.is_empty() || to.starts_with('/')) {
            return Err(InvalidRewrite(rule.to_string()));
        }

        Ok(Self::new(from, to))
    }

    /// Default rule for an operation: `/accounts/<op>` -> `/<op>`
    pub fn default_for(operation: Operation) -> Self {
        let name = operation.route_name();
        Self::new(format!("/accounts/{}", name), format!("/{}", name))
    }

    pub fn apply(&self, path: &str) -> String {
        let rest = match path.strip_prefix(self.from.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => return path.to_string(),
        };

        let rewritten = format!("{}{}", self.to, rest);
        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }
}

/// One backend endpoint
#[derive(Debug, Clone)]
pub struct TargetEndpoint {
    pub base_url: Url,
    pub rewrite: PathRewrite,
}

impl TargetEndpoint {
    pub fn new(base_url: Url, rewrite: PathRewrite) -> Self {
        Self { base_url, rewrite }
    }

    /// Full outbound URL for an inbound path and optional query string
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", base_path, self.rewrite.apply(path)));
        url.set_query(query);
        url
    }
}

/// Primary and fallback endpoints for one operation
#[derive(Debug, Clone)]
pub struct OperationTargets {
    pub primary: TargetEndpoint,
    pub fallback: TargetEndpoint,
}

impl OperationTargets {
    pub fn endpoint(&self, target: Target) -> &TargetEndpoint {
        match target {
            Target::Primary => &self.primary,
            Target::Fallback => &self.fallback,
        }
    }
}

/// Routing table for every operation
#[derive(Debug, Clone)]
pub struct ServiceTargets {
    pub balance: OperationTargets,
    pub deposit: OperationTargets,
    pub withdrawal: OperationTargets,
}

impl ServiceTargets {
    pub fn for_operation(&self, operation: Operation) -> &OperationTargets {
        match operation {
            Operation::BalanceRead => &self.balance,
            Operation::Deposit => &self.deposit,
            Operation::Withdrawal => &self.withdrawal,
        }
    }

    /// Same primary/fallback base URLs for every operation, default rewrites
    pub fn uniform(primary: Url, fallback: Url) -> Self {
        let targets = |operation: Operation| OperationTargets {
            primary: TargetEndpoint::new(primary.clone(), PathRewrite::default_for(operation)),
            fallback: TargetEndpoint::new(fallback.clone(), PathRewrite::default_for(operation)),
        };

        Self {
            balance: targets(Operation::BalanceRead),
            deposit: targets(Operation::Deposit),
            withdrawal: targets(Operation::Withdrawal),
        }
    }
}
