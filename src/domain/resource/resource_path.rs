use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::resource::resource_type::ResourceType;

/// Instance selector of one path segment.
///
/// A segment either names a specific instance (`Id`), matches any instance
/// (`Any`, written with a `*` suffix) or carries no instance information at
/// all (`None`, a bare type used by type-only templates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceId {
    Id(u32),
    Any,
    None,
}

impl InstanceId {
    /// True when this selector accepts the given concrete id.
    pub fn matches(&self, id: u32) -> bool {
        match self {
            InstanceId::Id(n) => *n == id,
            InstanceId::Any | InstanceId::None => true,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, InstanceId::Id(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub r_type: ResourceType,
    pub id: InstanceId,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            InstanceId::Id(n) => write!(f, "{}{}", self.r_type, n),
            InstanceId::Any => write!(f, "{}*", self.r_type),
            InstanceId::None => write!(f, "{}", self.r_type),
        }
    }
}

/// Outcome of comparing two paths segment by segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// Types and ids match pairwise.
    Equal,
    /// Types match pairwise, at least one id differs.
    EqualTypes,
    /// Type sequences differ (fatal for the query).
    TypeMismatch,
}

/// An ordered sequence of typed segments addressing one node of the
/// resource tree, e.g. `sys0.cpu1.pe3`.
///
/// Paths are value objects: they hold no reference to the resources they
/// address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourcePath {
    segments: Vec<PathSegment>,
}

impl ResourcePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parses a dotted path string. Each segment is a type name optionally
    /// followed by an instance number or a `*` wildcard:
    ///
    /// * `sys0.cpu1.pe3` (fully concrete)
    /// * `sys.cpu.pe` (type-only template)
    /// * `sys0.cpu*.pe2` (mixed, any cpu instance)
    pub fn parse(s: &str) -> Option<ResourcePath> {
        if s.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            let type_end = part.find(|c: char| c.is_ascii_digit() || c == '*').unwrap_or(part.len());
            let r_type = ResourceType::parse(&part[..type_end])?;
            let id = match &part[type_end..] {
                "" => InstanceId::None,
                "*" => InstanceId::Any,
                digits => InstanceId::Id(digits.parse().ok()?),
            };
            segments.push(PathSegment { r_type, id });
        }
        Some(ResourcePath { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The type of the last segment, i.e. the resource class this path
    /// ultimately addresses.
    pub fn target_type(&self) -> Option<ResourceType> {
        self.segments.last().map(|s| s.r_type)
    }

    /// True when every segment names a specific instance.
    pub fn is_concrete(&self) -> bool {
        self.segments.iter().all(|s| s.id.is_concrete())
    }

    /// Compares two paths segment by segment.
    pub fn compare(&self, other: &ResourcePath) -> PathMatch {
        if self.segments.len() != other.segments.len() {
            return PathMatch::TypeMismatch;
        }
        let mut ids_equal = true;
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            if a.r_type != b.r_type {
                return PathMatch::TypeMismatch;
            }
            if a.id != b.id {
                ids_equal = false;
            }
        }
        if ids_equal { PathMatch::Equal } else { PathMatch::EqualTypes }
    }

    /// True when `other` has the same type sequence, ignoring ids.
    pub fn template_equals(&self, other: &ResourcePath) -> bool {
        self.compare(other) != PathMatch::TypeMismatch
    }

    /// True when a fully concrete path satisfies this (possibly templated)
    /// path: concrete segments must match exactly, `Any`/`None` segments
    /// match any instance.
    pub fn accepts(&self, concrete: &ResourcePath) -> bool {
        if self.segments.len() != concrete.segments.len() {
            return false;
        }
        self.segments.iter().zip(concrete.segments.iter()).all(|(sel, c)| {
            sel.r_type == c.r_type
                && match c.id {
                    InstanceId::Id(n) => sel.id.matches(n),
                    // A registered path is always concrete; anything else cannot satisfy a selector.
                    _ => false,
                }
        })
    }

    /// The instance id selected for the given resource type, scanning from
    /// the leaf towards the root.
    pub fn instance_of(&self, r_type: ResourceType) -> Option<InstanceId> {
        self.segments.iter().rev().find(|s| s.r_type == r_type).map(|s| s.id)
    }

    /// Returns a copy of this path with the id of every `r_type` segment
    /// replaced by `dst_id`. Used when binding an abstract request onto a
    /// concrete binding-domain instance.
    pub fn with_instance(&self, r_type: ResourceType, dst_id: u32) -> ResourcePath {
        let segments = self
            .segments
            .iter()
            .map(|s| if s.r_type == r_type { PathSegment { r_type: s.r_type, id: InstanceId::Id(dst_id) } } else { *s })
            .collect();
        ResourcePath { segments }
    }

    /// The type-only template of this path (every id dropped).
    pub fn to_template(&self) -> ResourcePath {
        ResourcePath { segments: self.segments.iter().map(|s| PathSegment { r_type: s.r_type, id: InstanceId::None }).collect() }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in &self.segments {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
            first = false;
        }
        Ok(())
    }
}
