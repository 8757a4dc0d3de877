//! Relationship-related objects for OPC packages.
//!
//! This module provides types for managing relationships between parts in an OPC package.
//! A relationship is a directed edge from its owner (a part or the package itself) either
//! to another part in the package or to an external URL.

use crate::error::{OpcError, Result};
use crate::oxml::CtRelationships;
use crate::part::{Part, SharedPart};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The endpoint of a relationship.
///
/// Internal relationships point at another part of the same package and share
/// ownership of it; external relationships carry an opaque URL and have no
/// target part.
#[derive(Clone)]
pub enum Target {
    Part(SharedPart),
    External(String),
}

impl Target {
    /// Check whether two targets denote the same endpoint.
    ///
    /// Part targets compare by identity, external targets by URL.
    pub fn is_same(&self, other: &Target) -> bool {
        match (self, other) {
            (Target::Part(a), Target::Part(b)) => Rc::ptr_eq(a, b),
            (Target::External(a), Target::External(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Part(part) => match part.try_borrow() {
                Ok(part) => write!(f, "Target::Part({})", part.partname()),
                Err(_) => write!(f, "Target::Part(<borrowed>)"),
            },
            Target::External(url) => write!(f, "Target::External({})", url),
        }
    }
}

/// A single relationship from a source (part or package) to a target.
///
/// Identified by an rId unique within its owning collection. The target
/// reference of an internal relationship is never cached; it is recomputed
/// from the target's current partname on each access, so renaming a part is
/// reflected the next time any relationship to it is serialized.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    /// Target endpoint, internal part or external URL
    target: Target,

    /// Base URI for computing relative references
    base_uri: String,
}

impl Relationship {
    pub(crate) fn new(r_id: String, reltype: String, target: Target, base_uri: String) -> Self {
        Self {
            r_id,
            reltype,
            target,
            base_uri,
        }
    }

    /// Get the relationship ID.
    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Get the relationship type.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Get the target endpoint.
    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.target, Target::External(_))
    }

    /// Get the target part of an internal relationship.
    ///
    /// Returns an error for external relationships, which have no target part.
    pub fn target_part(&self) -> Result<SharedPart> {
        match &self.target {
            Target::Part(part) => Ok(Rc::clone(part)),
            Target::External(_) => Err(OpcError::ExternalRelationship(format!(
                "relationship '{}' is external and has no target part",
                self.r_id
            ))),
        }
    }

    /// Get the target reference.
    ///
    /// For external relationships, this is the absolute URL. For internal
    /// relationships, this is the reference to the target's current partname
    /// relative to the owner's base URI, e.g. "../media/image1.png".
    pub fn target_ref(&self) -> String {
        match &self.target {
            Target::External(url) => url.clone(),
            Target::Part(part) => part.borrow().partname().relative_ref(&self.base_uri),
        }
    }

    /// Check whether another relationship points at the same endpoint.
    pub fn same_target(&self, other: &Relationship) -> bool {
        self.target.is_same(&other.target)
    }
}

/// Collection of relationships from a single source.
///
/// Each part owns one collection for its outbound relationships, and the
/// package owns one for the root relationships. The base URI is fixed at
/// construction to the owner's directory and used for all relative-reference
/// computation.
#[derive(Debug, Clone)]
pub struct Relationships {
    /// Base URI for computing relative references
    base_uri: String,

    /// Map of relationship ID to Relationship
    rels: HashMap<String, Relationship>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    ///
    /// # Arguments
    /// * `base_uri` - Base URI of the owner (its directory, or "/" for the package)
    pub fn new(base_uri: String) -> Self {
        Self {
            base_uri,
            rels: HashMap::new(),
        }
    }

    /// Get the base URI of this collection.
    #[inline]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Add a relationship to the collection, keyed by `r_id`.
    ///
    /// No duplicate-target check is performed; use `get_or_add` for the
    /// idempotent form.
    pub fn add_relationship(&mut self, reltype: &str, target: Target, r_id: &str) -> &Relationship {
        let rel = Relationship::new(
            r_id.to_string(),
            reltype.to_string(),
            target,
            self.base_uri.clone(),
        );
        self.rels.insert(r_id.to_string(), rel);
        // Safe to unwrap since we just inserted it
        self.rels.get(r_id).unwrap()
    }

    /// Get a relationship by its ID.
    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.get(r_id)
    }

    /// Get a relationship by its ID, failing when absent.
    pub fn rel(&self, r_id: &str) -> Result<&Relationship> {
        self.rels.get(r_id).ok_or_else(|| {
            OpcError::RelationshipNotFound(format!("no relationship with rId '{}'", r_id))
        })
    }

    /// Get or add an internal relationship to a target part.
    ///
    /// If a relationship of the given type to the same part (by identity)
    /// already exists, it is returned unchanged and no rId is consumed.
    /// Otherwise a new relationship is created with the next available rId.
    pub fn get_or_add(&mut self, reltype: &str, target_part: &SharedPart) -> &Relationship {
        let existing = self
            .rels
            .values()
            .find(|rel| {
                rel.reltype() == reltype
                    && matches!(rel.target(), Target::Part(part) if Rc::ptr_eq(part, target_part))
            })
            .map(|rel| rel.r_id().to_string());

        match existing {
            // Re-lookup by rId to satisfy the borrow checker
            Some(r_id) => self.rels.get(&r_id).unwrap(),
            None => {
                let r_id = self.next_r_id();
                self.add_relationship(reltype, Target::Part(Rc::clone(target_part)), &r_id)
            }
        }
    }

    /// Get or add an external relationship to a URL.
    ///
    /// Returns the rId string rather than the relationship itself.
    pub fn get_or_add_ext_rel(&mut self, reltype: &str, url: &str) -> String {
        for rel in self.rels.values() {
            if rel.reltype() == reltype && rel.is_external() && rel.target_ref() == url {
                return rel.r_id().to_string();
            }
        }

        let r_id = self.next_r_id();
        self.add_relationship(reltype, Target::External(url.to_string()), &r_id);
        r_id
    }

    /// Get the target part of the relationship with the given type.
    ///
    /// The first internal match in iteration order wins; matching on more
    /// than one relationship of the same type is not detected. Returns an
    /// error when no relationship of the type exists.
    pub fn part_with_reltype(&self, reltype: &str) -> Result<SharedPart> {
        let rel = self
            .rels
            .values()
            .find(|rel| rel.reltype() == reltype && !rel.is_external())
            .ok_or_else(|| {
                OpcError::RelationshipNotFound(format!("no relationship of type '{}'", reltype))
            })?;
        rel.target_part()
    }

    /// Remove a relationship by its ID.
    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        self.rels.remove(r_id)
    }

    /// Get an iterator over all relationships.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.values()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Get the next available relationship ID.
    ///
    /// Generates IDs in the format "rId1", "rId2", etc., returning the
    /// lowest-numbered ID not already in use so gaps left by removed
    /// relationships are filled first.
    fn next_r_id(&self) -> String {
        let mut used_numbers: Vec<u32> = self
            .rels
            .keys()
            .filter_map(|r_id| {
                r_id.strip_prefix("rId")
                    .and_then(|digits| atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok())
            })
            .collect();

        used_numbers.sort_unstable();

        let mut next_num = 1u32;
        for &num in &used_numbers {
            match num.cmp(&next_num) {
                std::cmp::Ordering::Equal => next_num += 1,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {}
            }
        }

        format!("rId{}", next_num)
    }

    /// Serialize all contained relationships into the relationships-part XML form.
    ///
    /// Relationships are emitted sorted by rId number for reproducible output.
    /// Internal target references are recomputed from the targets' current
    /// partnames.
    pub fn xml(&self) -> Vec<u8> {
        let mut rels: Vec<&Relationship> = self.rels.values().collect();
        rels.sort_by_key(|rel| {
            let num = rel
                .r_id()
                .strip_prefix("rId")
                .and_then(|digits| atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok())
                .unwrap_or(u32::MAX);
            (num, rel.r_id().to_string())
        });

        let mut rels_elm = CtRelationships::new();
        for rel in rels {
            rels_elm.add_rel(rel.r_id(), rel.reltype(), &rel.target_ref(), rel.is_external());
        }
        rels_elm.xml()
    }
}

impl Default for Relationships {
    fn default() -> Self {
        Self::new("/".to_string())
    }
}
