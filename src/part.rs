//! Open Packaging Convention (OPC) objects related to package parts.
//!
//! This module provides the Part trait, its BlobPart and XmlPart implementations,
//! and the PartFactory used to construct the right part type for each content type
//! during package loading. Parts are the fundamental units of content in an OPC
//! package, each with a unique partname, a content type, and an outbound
//! relationship collection.

use crate::error::Result;
use crate::oxml::{self, XmlElement};
use crate::package::PackageRef;
use crate::packuri::PackURI;
use crate::rel::{Relationship, Relationships, Target};
use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

/// A part held in the package's relationship graph.
///
/// Parts are shared between every relationship that targets them; identity
/// comparisons (deduplication, reference counting) use `Rc::ptr_eq`.
pub type SharedPart = Rc<RefCell<dyn Part>>;

/// Constructor capability registered with `PartFactory` per content type.
pub type PartLoadFn = fn(PackURI, String, Vec<u8>, PackageRef) -> Result<SharedPart>;

/// Trait representing a part in an OPC package.
///
/// Each implementation provides the identity accessors and its own payload
/// representation; the relationship-graph behavior is shared through the
/// provided methods.
pub trait Part {
    /// Get the partname of this part.
    fn partname(&self) -> &PackURI;

    /// Change the partname of this part.
    ///
    /// Relationships targeting this part recompute their target references
    /// from the new partname the next time they are serialized.
    fn set_partname(&mut self, partname: PackURI);

    /// Get the content type of this part.
    fn content_type(&self) -> &str;

    /// Get the binary content of this part.
    ///
    /// XML parts serialize their current element tree on every access, so the
    /// result always reflects mutations made since loading.
    fn blob(&self) -> Cow<'_, [u8]>;

    /// Get the package this part belongs to.
    fn package(&self) -> PackageRef;

    /// Get the relationships for this part.
    fn rels(&self) -> &Relationships;

    /// Get mutable access to the relationships for this part.
    fn rels_mut(&mut self) -> &mut Relationships;

    /// Upcast to `Any`, so callers can downcast to the concrete part type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast to `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Attach a relationship with a known rId, without the idempotent lookup.
    ///
    /// Used during unmarshalling, where the serialized input is assumed to
    /// hold no duplicates.
    fn load_rel(&mut self, reltype: &str, target: Target, r_id: &str) -> &Relationship {
        self.rels_mut().add_relationship(reltype, target, r_id)
    }

    /// Add or get a relationship to another part of this package.
    ///
    /// Returns the rId of the existing relationship when one of the given
    /// type to the same part already exists, or of the newly created one.
    fn relate_to(&mut self, target: &SharedPart, reltype: &str) -> String {
        self.rels_mut().get_or_add(reltype, target).r_id().to_string()
    }

    /// Add or get an external relationship to a URL.
    fn relate_to_ext(&mut self, url: &str, reltype: &str) -> String {
        self.rels_mut().get_or_add_ext_rel(reltype, url)
    }

    /// Drop the relationship identified by `r_id` if it is the last one
    /// in this collection referencing its target.
    ///
    /// The reference count is recomputed per call by scanning the collection
    /// for relationships with the same target identity, so an endpoint still
    /// needed by another relationship keeps its entries.
    fn drop_rel(&mut self, r_id: &str) -> Result<()> {
        let ref_count = {
            let rels = self.rels();
            let rel = rels.rel(r_id)?;
            rels.iter().filter(|other| other.same_target(rel)).count()
        };
        if ref_count < 2 {
            self.rels_mut().remove(r_id);
        }
        Ok(())
    }

    /// Get the part related to this one by the relationship with `r_id`.
    fn related_part(&self, r_id: &str) -> Result<SharedPart> {
        self.rels().rel(r_id)?.target_part()
    }

    /// Get the part related to this one by a relationship of `reltype`.
    fn part_related_by(&self, reltype: &str) -> Result<SharedPart> {
        self.rels().part_with_reltype(reltype)
    }

    /// Get the target reference of the relationship with `r_id`.
    ///
    /// Works for both internal (relative reference) and external (URL)
    /// relationships.
    fn target_ref(&self, r_id: &str) -> Result<String> {
        Ok(self.rels().rel(r_id)?.target_ref())
    }
}

/// A part holding raw binary content, e.g. an image or embedded font.
///
/// This is the default part type for non-XML content.
#[derive(Debug)]
pub struct BlobPart {
    partname: PackURI,
    content_type: String,
    blob: Vec<u8>,
    rels: Relationships,
    package: PackageRef,
}

impl BlobPart {
    /// Create a new BlobPart.
    pub fn new(
        partname: PackURI,
        content_type: String,
        blob: Vec<u8>,
        package: PackageRef,
    ) -> Self {
        let rels = Relationships::new(partname.base_uri().to_string());
        Self {
            partname,
            content_type,
            blob,
            rels,
            package,
        }
    }

    /// Load a part from already-read bytes.
    pub fn load(
        partname: PackURI,
        content_type: String,
        blob: Vec<u8>,
        package: PackageRef,
    ) -> Result<SharedPart> {
        Ok(Rc::new(RefCell::new(Self::new(
            partname,
            content_type,
            blob,
            package,
        ))))
    }

    /// Replace the binary payload of this part.
    pub fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = blob;
    }
}

impl Part for BlobPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn set_partname(&mut self, partname: PackURI) {
        self.partname = partname;
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.blob)
    }

    fn package(&self) -> PackageRef {
        self.package.clone()
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A part holding a parsed XML element tree.
///
/// The tree is the single source of truth; the blob form is derived by
/// serializing the current tree on each access and is never cached.
#[derive(Debug)]
pub struct XmlPart {
    partname: PackURI,
    content_type: String,
    element: XmlElement,
    rels: Relationships,
    package: PackageRef,
}

impl XmlPart {
    /// Create a new XmlPart from an already-parsed element tree.
    pub fn new(
        partname: PackURI,
        content_type: String,
        element: XmlElement,
        package: PackageRef,
    ) -> Self {
        let rels = Relationships::new(partname.base_uri().to_string());
        Self {
            partname,
            content_type,
            element,
            rels,
            package,
        }
    }

    /// Load an XML part by parsing already-read bytes.
    pub fn load(
        partname: PackURI,
        content_type: String,
        blob: Vec<u8>,
        package: PackageRef,
    ) -> Result<SharedPart> {
        let element = oxml::parse_xml(&blob)?;
        Ok(Rc::new(RefCell::new(Self::new(
            partname,
            content_type,
            element,
            package,
        ))))
    }

    /// Get the root element of this part's XML tree.
    #[inline]
    pub fn element(&self) -> &XmlElement {
        &self.element
    }

    /// Get mutable access to the root element of this part's XML tree.
    #[inline]
    pub fn element_mut(&mut self) -> &mut XmlElement {
        &mut self.element
    }

    /// The part itself.
    ///
    /// Element wrappers in a document model built on top of this part can ask
    /// their owner which part they belong to; at the top of that chain the
    /// answer is the part itself.
    #[inline]
    pub fn part(&self) -> &XmlPart {
        self
    }
}

impl Part for XmlPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn set_partname(&mut self, partname: PackURI) {
        self.partname = partname;
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> Cow<'_, [u8]> {
        Cow::Owned(oxml::serialize_part_xml(&self.element))
    }

    fn package(&self) -> PackageRef {
        self.package.clone()
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Factory for creating Part instances based on content type.
///
/// An explicit registry consulted on every load: content types registered by
/// higher-level code dispatch to their constructor, anything else falls back
/// to `XmlPart` for XML content types and `BlobPart` otherwise. Registration
/// happens before the load pass; the table is not mutated during use.
pub struct PartFactory {
    part_type_for: std::collections::HashMap<String, PartLoadFn>,
}

impl PartFactory {
    /// Create a factory with no custom registrations.
    pub fn new() -> Self {
        Self {
            part_type_for: std::collections::HashMap::new(),
        }
    }

    /// Register a custom part constructor for a content type.
    pub fn register(&mut self, content_type: &str, loader: PartLoadFn) {
        self.part_type_for.insert(content_type.to_string(), loader);
    }

    /// Construct the part for a serialized part record.
    pub fn load(
        &self,
        partname: PackURI,
        content_type: String,
        blob: Vec<u8>,
        package: PackageRef,
    ) -> Result<SharedPart> {
        if let Some(loader) = self.part_type_for.get(&content_type) {
            return loader(partname, content_type, blob, package);
        }
        if Self::is_xml_content_type(&content_type) {
            XmlPart::load(partname, content_type, blob, package)
        } else {
            BlobPart::load(partname, content_type, blob, package)
        }
    }

    /// Check if a content type represents XML content.
    #[inline]
    fn is_xml_content_type(content_type: &str) -> bool {
        content_type.ends_with("+xml") || content_type.ends_with("/xml")
    }
}

impl Default for PartFactory {
    fn default() -> Self {
        Self::new()
    }
}
