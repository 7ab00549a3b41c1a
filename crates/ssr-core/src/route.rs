//! Route table with nested matching and typed data bindings.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::context::RouteParams;
use crate::key::QueryKey;
use crate::loader::Loader;

/// Errors detected while building a [`RouteTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("invalid parameter segment '{segment}' in route '{path}'")]
    InvalidParam { path: String, segment: String },

    #[error("splat must be the last segment of a route branch: '{0}'")]
    SplatNotLast(String),

    #[error("parameter ':{param}' declared twice in branch ending at '{path}'")]
    DuplicateParam { path: String, param: String },

    #[error("index route '{0}' cannot have children")]
    IndexWithChildren(String),

    #[error("cache key {key} bound twice in branch ending at '{path}'")]
    DuplicateKey { path: String, key: String },
}

/// Association between a route and the data it prefetches.
///
/// The cache key and the loader travel together, so a route either declares
/// both or neither.
#[derive(Clone)]
pub struct DataBinding {
    /// Cache key the loader result is stored under.
    pub key: QueryKey,
    /// Loader invoked with the route parameters.
    pub loader: Arc<dyn Loader>,
}

impl fmt::Debug for DataBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBinding")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Declarative route definition, possibly with nested children.
#[derive(Debug, Clone, Default)]
pub struct RouteDescriptor {
    /// Path pattern relative to the parent (e.g. `":locale?"`, `"product/:id"`).
    pub path: String,
    /// Whether this is the index route of its parent.
    pub index: bool,
    /// Optional identifier used by renderers to pick a page.
    pub id: Option<String>,
    /// Optional data binding.
    pub data: Option<DataBinding>,
    /// Nested routes.
    pub children: Vec<RouteDescriptor>,
}

impl RouteDescriptor {
    /// Create a route for a path pattern.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create an index route (matches its parent's path exactly).
    pub fn index() -> Self {
        Self {
            index: true,
            ..Default::default()
        }
    }

    /// Create a pathless layout route.
    pub fn layout() -> Self {
        Self::default()
    }

    /// Set the route identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Bind a loader to a cache key.
    pub fn with_data(mut self, key: impl Into<QueryKey>, loader: impl Loader + 'static) -> Self {
        self.data = Some(DataBinding {
            key: key.into(),
            loader: Arc::new(loader),
        });
        self
    }

    /// Add a child route.
    pub fn child(mut self, route: RouteDescriptor) -> Self {
        self.children.push(route);
        self
    }

    /// Add multiple child routes.
    pub fn with_children(mut self, routes: Vec<RouteDescriptor>) -> Self {
        self.children.extend(routes);
        self
    }
}

/// A route stored in the table, children stripped.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Path pattern as declared.
    pub path: String,
    /// Whether this is an index route.
    pub index: bool,
    /// Optional identifier.
    pub id: Option<String>,
    /// Optional data binding.
    pub data: Option<DataBinding>,
}

/// One matched route of a branch.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// The matched route.
    pub route: &'a RouteEntry,
    /// Parameters captured by this route and its ancestors.
    pub params: RouteParams,
    /// Portion of the path matched up to and including this route.
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Splat,
}

#[derive(Debug, Clone)]
struct PatternSegment {
    segment: Segment,
    optional: bool,
    /// Position (within the branch) of the route owning this segment.
    owner: usize,
}

#[derive(Debug, Clone)]
struct Branch {
    routes: Vec<usize>,
    segments: Vec<(Segment, usize)>,
    score: i32,
}

/// Immutable, validated route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    branches: Vec<Branch>,
}

impl RouteTable {
    /// Validate and compile a list of top-level routes.
    pub fn new(routes: Vec<RouteDescriptor>) -> Result<Self, RouteError> {
        let mut table = Self {
            entries: Vec::new(),
            branches: Vec::new(),
        };

        for route in routes {
            table.flatten(route, &[], &[])?;
        }

        // Stable: equal scores keep flatten order (children before parents).
        table.branches.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(table)
    }

    /// Number of routes in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match a path against the table.
    ///
    /// Returns the matched branch from the outermost layout to the leaf, or
    /// `None` when no branch matches the whole path. Query string and
    /// fragment are ignored.
    pub fn match_path(&self, path: &str) -> Option<Vec<RouteMatch<'_>>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.branches
            .iter()
            .find_map(|branch| self.match_branch(branch, &parts))
    }

    fn flatten(
        &mut self,
        route: RouteDescriptor,
        parent_segments: &[PatternSegment],
        parent_routes: &[usize],
    ) -> Result<(), RouteError> {
        if route.index && !route.children.is_empty() {
            return Err(RouteError::IndexWithChildren(route.path));
        }

        let position = parent_routes.len();
        let own = parse_pattern(&route.path, position)?;

        if parent_segments
            .iter()
            .any(|s| s.segment == Segment::Splat)
            && (!own.is_empty() || !route.children.is_empty())
        {
            return Err(RouteError::SplatNotLast(route.path));
        }
        if own
            .iter()
            .rev()
            .skip(1)
            .any(|s| s.segment == Segment::Splat)
        {
            return Err(RouteError::SplatNotLast(route.path));
        }

        let mut segments = parent_segments.to_vec();
        segments.extend(own);
        check_duplicate_params(&segments, &route.path)?;

        let id = self.entries.len();
        let mut routes = parent_routes.to_vec();
        routes.push(id);

        if let Some(binding) = &route.data {
            let hash = binding.key.hash();
            let clash = parent_routes.iter().any(|&r| {
                self.entries[r]
                    .data
                    .as_ref()
                    .is_some_and(|b| b.key.hash() == hash)
            });
            if clash {
                return Err(RouteError::DuplicateKey {
                    path: route.path,
                    key: hash,
                });
            }
        }

        let is_branch = !(route.path.is_empty() && !route.index);
        let index = route.index;
        self.entries.push(RouteEntry {
            path: route.path,
            index,
            id: route.id,
            data: route.data,
        });

        for child in route.children {
            self.flatten(child, &segments, &routes)?;
        }

        if is_branch {
            for variant in explode_optional(&segments) {
                let score = compute_score(&variant, index);
                self.branches.push(Branch {
                    routes: routes.clone(),
                    segments: variant,
                    score,
                });
            }
        }

        Ok(())
    }

    fn match_branch<'a>(&'a self, branch: &Branch, parts: &[&str]) -> Option<Vec<RouteMatch<'a>>> {
        let mut consumed = 0;
        // (owner, name, value)
        let mut captured: Vec<(usize, String, String)> = Vec::new();
        // (owner, parts consumed after this segment)
        let mut ends: Vec<(usize, usize)> = Vec::new();

        for (segment, owner) in &branch.segments {
            match segment {
                Segment::Static(expected) => {
                    let part = parts.get(consumed)?;
                    if !part.eq_ignore_ascii_case(expected) {
                        return None;
                    }
                    consumed += 1;
                }
                Segment::Param(name) => {
                    let part = parts.get(consumed)?;
                    captured.push((*owner, name.clone(), percent_decode(part)));
                    consumed += 1;
                }
                Segment::Splat => {
                    let rest = parts[consumed..].join("/");
                    captured.push((*owner, "*".to_string(), percent_decode(&rest)));
                    consumed = parts.len();
                }
            }
            ends.push((*owner, consumed));
        }

        if consumed != parts.len() {
            return None;
        }

        let mut matches = Vec::with_capacity(branch.routes.len());
        let mut end = 0;
        for (position, &route_id) in branch.routes.iter().enumerate() {
            if let Some(&(_, e)) = ends.iter().rev().find(|(owner, _)| *owner == position) {
                end = e;
            }
            let params = captured
                .iter()
                .filter(|(owner, _, _)| *owner <= position)
                .map(|(_, k, v)| (k.clone(), v.clone()))
                .collect();
            matches.push(RouteMatch {
                route: &self.entries[route_id],
                params,
                pathname: format!("/{}", parts[..end].join("/")),
            });
        }

        Some(matches)
    }
}

fn parse_pattern(path: &str, owner: usize) -> Result<Vec<PatternSegment>, RouteError> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            let (segment, optional) = if raw == "*" {
                (Segment::Splat, false)
            } else if let Some(param) = raw.strip_prefix(':') {
                let (name, optional) = match param.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (param, false),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(RouteError::InvalidParam {
                        path: path.to_string(),
                        segment: raw.to_string(),
                    });
                }
                (Segment::Param(name.to_string()), optional)
            } else {
                (Segment::Static(raw.to_string()), false)
            };
            Ok(PatternSegment {
                segment,
                optional,
                owner,
            })
        })
        .collect()
}

fn check_duplicate_params(segments: &[PatternSegment], path: &str) -> Result<(), RouteError> {
    let mut seen = HashSet::new();
    for s in segments {
        if let Segment::Param(name) = &s.segment {
            if !seen.insert(name.as_str()) {
                return Err(RouteError::DuplicateParam {
                    path: path.to_string(),
                    param: name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Expand every optional segment into a with/without pair of variants.
fn explode_optional(segments: &[PatternSegment]) -> Vec<Vec<(Segment, usize)>> {
    let mut variants: Vec<Vec<(Segment, usize)>> = vec![Vec::new()];
    for s in segments {
        let entry = (s.segment.clone(), s.owner);
        if s.optional {
            let without = variants.clone();
            for v in &mut variants {
                v.push(entry.clone());
            }
            variants.extend(without);
        } else {
            for v in &mut variants {
                v.push(entry.clone());
            }
        }
    }
    variants
}

/// Rank a branch: static segments beat dynamic ones, splats lose, index
/// routes win over their layout.
fn compute_score(segments: &[(Segment, usize)], index: bool) -> i32 {
    let mut score = segments.len() as i32 + 1;
    if segments.iter().any(|(s, _)| *s == Segment::Splat) {
        score -= 2;
    }
    if index {
        score += 2;
    }
    score
        + segments
            .iter()
            .map(|(s, _)| match s {
                Segment::Static(_) => 10,
                Segment::Param(_) => 3,
                Segment::Splat => 0,
            })
            .sum::<i32>()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}
