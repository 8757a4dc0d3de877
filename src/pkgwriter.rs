//! Package writer for OPC packages.
//!
//! This module serializes a package's relationship graph back into container
//! form: the [Content_Types].xml member, the package-level .rels member, and
//! every part's payload plus its own .rels member when it has relationships.

use crate::constants::content_type as ct;
use crate::error::Result;
use crate::oxml::CtTypes;
use crate::packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
use crate::part::{Part, SharedPart};
use crate::phys_pkg::PhysPkgWriter;
use crate::rel::Relationships;
use std::collections::HashMap;
use std::path::Path;

/// Package writer that serializes a package into a ZIP container.
///
/// # Example
///
/// ```no_run
/// use longan::{OpcPackage, PackageWriter};
///
/// let pkg = OpcPackage::new();
/// // ... add parts to package ...
/// let rels = pkg.rels().clone();
/// PackageWriter::write("output.pptx", &rels, &pkg.parts())?;
/// # Ok::<(), longan::OpcError>(())
/// ```
pub struct PackageWriter;

impl PackageWriter {
    /// Write a package to a file.
    ///
    /// # Arguments
    /// * `path` - Path where the package should be written
    /// * `pkg_rels` - The package-level relationships
    /// * `parts` - All parts of the package
    pub fn write<P: AsRef<Path>>(
        path: P,
        pkg_rels: &Relationships,
        parts: &[SharedPart],
    ) -> Result<()> {
        let bytes = Self::to_bytes(pkg_rels, parts)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Write a package to a stream.
    pub fn write_to_stream<W: std::io::Write>(
        mut writer: W,
        pkg_rels: &Relationships,
        parts: &[SharedPart],
    ) -> Result<()> {
        let bytes = Self::to_bytes(pkg_rels, parts)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Serialize a package to bytes.
    pub fn to_bytes(pkg_rels: &Relationships, parts: &[SharedPart]) -> Result<Vec<u8>> {
        let mut phys_writer = PhysPkgWriter::new();

        Self::write_content_types(&mut phys_writer, parts)?;
        Self::write_pkg_rels(&mut phys_writer, pkg_rels)?;
        Self::write_parts(&mut phys_writer, parts)?;

        phys_writer.finish()
    }

    /// Write the [Content_Types].xml member.
    fn write_content_types(phys_writer: &mut PhysPkgWriter, parts: &[SharedPart]) -> Result<()> {
        let cti = ContentTypesItem::from_parts(parts);
        let content_types_uri = PackURI::new(CONTENT_TYPES_URI)?;
        phys_writer.write(&content_types_uri, &cti.xml())
    }

    /// Write the package-level relationships member (_rels/.rels).
    fn write_pkg_rels(phys_writer: &mut PhysPkgWriter, pkg_rels: &Relationships) -> Result<()> {
        let rels_uri = PackURI::new(PACKAGE_URI)?.rels_uri()?;
        phys_writer.write(&rels_uri, &pkg_rels.xml())
    }

    /// Write every part's payload and, when present, its relationships member.
    fn write_parts(phys_writer: &mut PhysPkgWriter, parts: &[SharedPart]) -> Result<()> {
        for part in parts {
            let part = part.borrow();
            phys_writer.write(part.partname(), &part.blob())?;

            if !part.rels().is_empty() {
                let rels_uri = part.partname().rels_uri()?;
                phys_writer.write(&rels_uri, &part.rels().xml())?;
            }
        }
        Ok(())
    }
}

/// Helper for building [Content_Types].xml content.
///
/// Parts whose extension maps to a well-known default content type share a
/// Default element; every other part gets an Override element for its exact
/// partname.
struct ContentTypesItem {
    /// Default content types by extension
    defaults: HashMap<String, String>,

    /// Override content types by partname
    overrides: HashMap<String, String>,
}

impl ContentTypesItem {
    fn new() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("rels".to_string(), ct::OPC_RELATIONSHIPS.to_string());
        defaults.insert("xml".to_string(), ct::XML.to_string());

        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    /// Build a ContentTypesItem covering all given parts.
    fn from_parts(parts: &[SharedPart]) -> Self {
        let mut cti = Self::new();
        for part in parts {
            let part = part.borrow();
            cti.add_content_type(part.partname(), part.content_type());
        }
        cti
    }

    /// Add the content type for one part.
    fn add_content_type(&mut self, partname: &PackURI, content_type: &str) {
        let ext = partname.ext().to_lowercase();

        if Self::is_default_content_type(&ext, content_type) {
            self.defaults.insert(ext, content_type.to_string());
        } else {
            self.overrides
                .insert(partname.to_string(), content_type.to_string());
        }
    }

    /// Check if an extension/content-type pair is a standard default.
    fn is_default_content_type(ext: &str, content_type: &str) -> bool {
        matches!(
            (ext, content_type),
            ("rels", ct::OPC_RELATIONSHIPS)
                | ("xml", ct::XML)
                | ("png", "image/png")
                | ("jpg", "image/jpeg")
                | ("jpeg", "image/jpeg")
                | ("gif", "image/gif")
                | ("emf", "image/x-emf")
                | ("wmf", "image/x-wmf")
        )
    }

    /// Generate the XML for [Content_Types].xml.
    fn xml(&self) -> Vec<u8> {
        let mut types = CtTypes::new();
        for (ext, content_type) in &self.defaults {
            types.add_default(ext, content_type);
        }
        for (partname, content_type) in &self.overrides {
            types.add_override(partname, content_type);
        }
        types.xml()
    }
}
