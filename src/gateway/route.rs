//! Static route table

use serde::{Deserialize, Serialize};

use crate::config::RouteConfig;

/// Filters a route runs before forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    RateLimit,
    Tenant,
    Auth,
}

impl FilterKind {
    /// Chain every route in this system runs
    pub const CHAIN: [FilterKind; 3] = [FilterKind::RateLimit, FilterKind::Tenant, FilterKind::Auth];
}

/// One route: path patterns mapped to a backend
///
/// Patterns ending in `/**` match the prefix and everything below it; other
/// patterns match the exact path only.
#[derive(Debug, Clone)]
pub struct Route {
    id: String,
    path_patterns: Vec<String>,
    backend: String,
    filter_order: Vec<FilterKind>,
    strip_prefix: usize,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        path_patterns: Vec<String>,
        backend: impl Into<String>,
        strip_prefix: usize,
    ) -> Self {
        Self {
            id: id.into(),
            path_patterns,
            backend: backend.into(),
            filter_order: FilterKind::CHAIN.to_vec(),
            strip_prefix,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn path_patterns(&self) -> &[String] {
        &self.path_patterns
    }

    pub fn filter_order(&self) -> &[FilterKind] {
        &self.filter_order
    }

    pub fn strip_prefix(&self) -> usize {
        self.strip_prefix
    }

    /// Length of the longest pattern matching `path`
    fn match_len(&self, path: &str) -> Option<usize> {
        self.path_patterns
            .iter()
            .filter_map(|pattern| pattern_match_len(pattern, path))
            .max()
    }
}

fn pattern_match_len(pattern: &str, path: &str) -> Option<usize> {
    match pattern.strip_suffix("/**") {
        Some(prefix) => {
            let matches = prefix.is_empty()
                || path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'));
            matches.then_some(prefix.len())
        }
        // an exact match outranks a wildcard over the same prefix
        None => (path == pattern).then_some(pattern.len() + 1),
    }
}

/// Remove the first `count` path segments, keeping the remainder rooted at `/`
pub fn strip_segments(path: &str, count: usize) -> String {
    if count == 0 {
        return path.to_string();
    }
    let rest = path
        .trim_start_matches('/')
        .splitn(count + 1, '/')
        .nth(count)
        .unwrap_or("");
    format!("/{}", rest)
}

/// Immutable route table shared by all request tasks
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn from_config(routes: &[RouteConfig]) -> Self {
        Self::new(
            routes
                .iter()
                .map(|r| Route::new(r.id.clone(), r.paths.clone(), r.backend.clone(), r.strip_prefix))
                .collect(),
        )
    }

    /// Longest-prefix match over every route's patterns
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        let mut best: Option<(&Route, usize)> = None;
        for route in &self.routes {
            if let Some(len) = route.match_len(path) {
                if best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((route, len));
                }
            }
        }
        best.map(|(route, _)| route)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(vec![
            Route::new("user-service", vec!["/api/v1/users/**".into(), "/api/v1/auth/**".into()], "user-service", 0),
            Route::new("visitor-service", vec!["/api/v1/visitors/**".into()], "visitor-service", 0),
            Route::new("visitor-export", vec!["/api/v1/visitors/export/**".into()], "analytics-service", 2),
            Route::new("status", vec!["/status".into()], "audit-service", 0),
        ])
    }

    #[test]
    fn test_prefix_match() {
        let table = table();
        assert_eq!(table.match_path("/api/v1/visitors").unwrap().id(), "visitor-service");
        assert_eq!(table.match_path("/api/v1/visitors/123").unwrap().id(), "visitor-service");
        assert_eq!(table.match_path("/api/v1/auth/login").unwrap().id(), "user-service");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();
        assert_eq!(
            table.match_path("/api/v1/visitors/export/csv").unwrap().id(),
            "visitor-export"
        );
    }

    #[test]
    fn test_no_partial_segment_match() {
        let table = table();
        assert!(table.match_path("/api/v1/visitorsx").is_none());
        assert!(table.match_path("/api/v2/visitors").is_none());
        assert!(table.match_path("/status/extra").is_none());
        assert_eq!(table.match_path("/status").unwrap().id(), "status");
    }

    #[test]
    fn test_every_route_runs_fixed_chain() {
        for route in table().routes() {
            assert_eq!(route.filter_order(), &FilterKind::CHAIN);
        }
    }

    #[test]
    fn test_strip_segments() {
        assert_eq!(strip_segments("/api/v1/visitors/1", 0), "/api/v1/visitors/1");
        assert_eq!(strip_segments("/api/v1/visitors/1", 2), "/visitors/1");
        assert_eq!(strip_segments("/api/v1/", 1), "/v1/");
        assert_eq!(strip_segments("/api", 3), "/");
    }
}
