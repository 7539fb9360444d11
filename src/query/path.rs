use serde::Serialize;

use super::types::MAX_PATH_DEPTH;
use crate::errors::DbError;
use crate::schema::{EntitySchema, Property, PropertyKind, ScalarType};

/// What a resolved path ends on; drives operator/type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LeafKind {
    Scalar(ScalarType),
    Embedded,
    GeoPoint,
    /// Collection leaf; `geo` when its elements are points.
    Collection { geo: bool },
    Reference,
}

impl LeafKind {
    fn of(kind: &PropertyKind) -> Self {
        match kind {
            PropertyKind::Scalar(t) => Self::Scalar(*t),
            PropertyKind::Embedded(_) => Self::Embedded,
            PropertyKind::GeoPoint => Self::GeoPoint,
            PropertyKind::Collection(inner) => Self::Collection { geo: inner.is_geo() },
            PropertyKind::Reference(_) => Self::Reference,
        }
    }
}

/// A resolved, schema-validated chain of property names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyPath {
    segments: Vec<String>,
    leaf: LeafKind,
}

impl PropertyPath {
    /// Resolve a camel-case token such as `AddressZipCode` against `schema`.
    ///
    /// Every split of the token on uppercase boundaries is tried; the shallowest
    /// resolving path wins. `_` in the token forces a segment boundary.
    ///
    /// # Errors
    /// `UnresolvedProperty` when nothing resolves, `AmbiguousProperty` when two
    /// paths of equal depth do.
    pub fn resolve(schema: &EntitySchema, token: &str, method: &str) -> Result<Self, DbError> {
        match Resolution::of(schema, token) {
            Resolution::Found(p) => Ok(p),
            Resolution::Ambiguous(candidates) => Err(DbError::AmbiguousProperty {
                method: method.to_string(),
                token: token.to_string(),
                candidates,
            }),
            Resolution::Missing => Err(DbError::UnresolvedProperty {
                method: method.to_string(),
                entity: schema.name.clone(),
                token: token.to_string(),
            }),
        }
    }

    /// Resolve an already dotted document path (`address.zipCode`).
    ///
    /// # Errors
    /// `UnresolvedProperty` naming the full path.
    pub fn resolve_dotted(schema: &EntitySchema, dotted: &str, method: &str) -> Result<Self, DbError> {
        let unresolved = || DbError::UnresolvedProperty {
            method: method.to_string(),
            entity: schema.name.clone(),
            token: dotted.to_string(),
        };
        let mut scope = Some(schema);
        let mut segments = Vec::new();
        let mut last = None;
        for part in dotted.split('.') {
            let current = scope.ok_or_else(unresolved)?;
            if segments.len() >= MAX_PATH_DEPTH {
                return Err(unresolved());
            }
            let prop = current.get(part).or_else(|| current.matching(part).next()).ok_or_else(unresolved)?;
            segments.push(prop.name.clone());
            scope = prop.kind.nested();
            last = Some(prop);
        }
        let last = last.ok_or_else(unresolved)?;
        Ok(Self { segments, leaf: LeafKind::of(&last.kind) })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub const fn leaf(&self) -> LeafKind {
        self.leaf
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Document path used by the store.
    #[must_use]
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }

    #[must_use]
    pub const fn is_geo(&self) -> bool {
        matches!(self.leaf, LeafKind::GeoPoint | LeafKind::Collection { geo: true })
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self.leaf, LeafKind::Collection { .. })
    }

    #[must_use]
    pub const fn scalar_type(&self) -> Option<ScalarType> {
        match self.leaf {
            LeafKind::Scalar(t) => Some(t),
            _ => None,
        }
    }
}

/// Outcome of resolving a token without committing to an error.
#[derive(Debug)]
pub(crate) enum Resolution {
    Found(PropertyPath),
    Ambiguous(Vec<String>),
    Missing,
}

impl Resolution {
    pub(crate) fn of(schema: &EntitySchema, token: &str) -> Self {
        if token.is_empty() {
            return Self::Missing;
        }
        let mut chains: Vec<Vec<&Property>> = vec![Vec::new()];
        for chunk in token.split('_') {
            if chunk.is_empty() {
                return Self::Missing;
            }
            let mut next = Vec::new();
            for chain in &chains {
                let scope = match chain.last() {
                    None => schema,
                    Some(p) => match p.kind.nested() {
                        Some(s) => s,
                        None => continue,
                    },
                };
                for tail in candidates(scope, chunk, chain.len()) {
                    let mut c = chain.clone();
                    c.extend(tail);
                    next.push(c);
                }
            }
            chains = next;
        }
        let Some(min) = chains.iter().map(Vec::len).min() else {
            return Self::Missing;
        };
        let mut best: Vec<Vec<&Property>> = chains.into_iter().filter(|c| c.len() == min).collect();
        if best.len() > 1 {
            let mut names: Vec<String> = best.iter().map(|c| dotted(c)).collect();
            names.sort();
            names.dedup();
            return Self::Ambiguous(names);
        }
        let Some(chain) = best.pop() else { return Self::Missing };
        let Some(last) = chain.last() else { return Self::Missing };
        Self::Found(PropertyPath {
            segments: chain.iter().map(|p| p.name.clone()).collect(),
            leaf: LeafKind::of(&last.kind),
        })
    }
}

fn dotted(chain: &[&Property]) -> String {
    chain.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(".")
}

/// Every property chain in `scope` spelling exactly `s`.
fn candidates<'a>(scope: &'a EntitySchema, s: &str, depth: usize) -> Vec<Vec<&'a Property>> {
    let mut out = Vec::new();
    if depth >= MAX_PATH_DEPTH {
        return out;
    }
    let splits = s
        .char_indices()
        .filter(|(i, c)| *i > 0 && c.is_ascii_uppercase())
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()));
    for at in splits {
        let (head, tail) = s.split_at(at);
        for prop in scope.matching(head) {
            if tail.is_empty() {
                out.push(vec![prop]);
            } else if let Some(nested) = prop.kind.nested() {
                for rest in candidates(nested, tail, depth + 1) {
                    let mut chain = Vec::with_capacity(rest.len() + 1);
                    chain.push(prop);
                    chain.extend(rest);
                    out.push(chain);
                }
            }
        }
    }
    out
}
