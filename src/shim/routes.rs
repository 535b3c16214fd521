use axum::http::Method;
use std::collections::HashSet;

use crate::error::{Result, ServiceError};

/// Mock Service operation a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ListSubscriptions,
    AddSubscription,
    ListPayments,
    AddPayment,
    ListQuestions,
    AddQuestion,
    AnswerQuestion,
    UploadFile,
    CreateInvoice,
    GetSettings,
    GetUser,
    SaveUser,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub method: Method,
    /// One or two path segments, e.g. `questions` or `questions/answer`.
    pub pattern: &'static str,
    pub route: Route,
}

impl RouteEntry {
    pub fn new(method: Method, pattern: &'static str, route: Route) -> Self {
        Self {
            method,
            pattern,
            route,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Matched(Route),
    /// The path is known but not for this method.
    MethodNotAllowed,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            let pattern = entry.pattern;
            let segments = pattern.split('/').collect::<Vec<_>>();
            if pattern.is_empty()
                || segments.iter().any(|s| s.is_empty())
                || segments.len() > 2
            {
                return Err(ServiceError::RouteTable(format!(
                    "pattern {pattern:?} must be one or two non-empty segments"
                )));
            }
            if !seen.insert((entry.method.clone(), pattern)) {
                return Err(ServiceError::RouteTable(format!(
                    "duplicate route {} {}",
                    entry.method, pattern
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn standard() -> Result<Self> {
        use Route::*;
        Self::new(vec![
            RouteEntry::new(Method::GET, "subscriptions", ListSubscriptions),
            RouteEntry::new(Method::POST, "subscriptions", AddSubscription),
            RouteEntry::new(Method::GET, "payments", ListPayments),
            RouteEntry::new(Method::POST, "payments", AddPayment),
            RouteEntry::new(Method::GET, "questions", ListQuestions),
            RouteEntry::new(Method::POST, "questions", AddQuestion),
            RouteEntry::new(Method::POST, "questions/answer", AnswerQuestion),
            RouteEntry::new(Method::POST, "questions/upload", UploadFile),
            RouteEntry::new(Method::POST, "lava/create_invoice", CreateInvoice),
            RouteEntry::new(Method::GET, "settings", GetSettings),
            RouteEntry::new(Method::GET, "users", GetUser),
            RouteEntry::new(Method::POST, "users", SaveUser),
        ])
    }

    /// Distinct patterns in table order.
    pub fn patterns(&self) -> Vec<&'static str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.pattern)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Matches the last two path segments first, then the last one.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut candidates = Vec::with_capacity(2);
        if segments.len() >= 2 {
            candidates.push(segments[segments.len() - 2..].join("/"));
        }
        if let Some(last) = segments.last() {
            candidates.push((*last).to_string());
        }

        for candidate in candidates {
            let mut known = false;
            for entry in self.entries.iter().filter(|e| e.pattern == candidate) {
                if entry.method == *method {
                    return Resolution::Matched(entry.route);
                }
                known = true;
            }
            if known {
                return Resolution::MethodNotAllowed;
            }
        }
        Resolution::Unknown
    }
}
