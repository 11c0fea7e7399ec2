use std::fmt::Display;

use http::Method;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OperationClass {
    Read,
    Write,
}

impl OperationClass {
    /// Retrieval-only methods count as reads, everything else mutates
    pub fn for_method(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
            Self::Read
        } else {
            Self::Write
        }
    }
}

impl Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
        }
    }
}

/// Who a request is accounted to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestIdentity {
    User(String),
    Anonymous,
}

impl RequestIdentity {
    pub fn resolve(username: Option<&str>) -> Self {
        match username {
            Some(username) if !username.is_empty() => Self::User(username.to_owned()),
            _ => Self::Anonymous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    /// Shared by all unauthenticated traffic, never limited
    Anonymous,
    User {
        class: OperationClass,
        user_id: String,
    },
}

impl PartitionKey {
    pub fn build(method: &Method, identity: &RequestIdentity) -> Self {
        match identity {
            RequestIdentity::Anonymous => Self::Anonymous,
            RequestIdentity::User(user_id) => Self::User {
                class: OperationClass::for_method(method),
                user_id: user_id.clone(),
            },
        }
    }

    pub fn class(&self) -> Option<OperationClass> {
        match self {
            Self::Anonymous => None,
            Self::User { class, .. } => Some(*class),
        }
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous-RateLimit-"),
            Self::User { class, user_id } => write!(f, "{class}-RateLimit-{user_id}"),
        }
    }
}
