//! Low-level, read-only API to a serialized Open Packaging Convention (OPC) package.
//!
//! This module provides the PackageReader for parsing OPC packages, including
//! content type mapping, relationship parsing, and part loading. Parts are
//! discovered by walking the serialized relationship graph from the package
//! root, so unreferenced archive members are never loaded.

use crate::constants::target_mode;
use crate::error::{OpcError, Result};
use crate::packuri::{PACKAGE_URI, PackURI};
use crate::phys_pkg::PhysPkgReader;
use quick_xml::Reader;
use quick_xml::events::Event;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Serialized part with its content and relationships.
///
/// Represents a part as loaded from the physical package, before being
/// converted into a Part object.
#[derive(Debug)]
pub struct SerializedPart {
    /// The partname (URI) of this part
    pub partname: PackURI,

    /// The content type of this part
    pub content_type: String,

    /// The binary content of this part
    pub blob: Vec<u8>,

    /// Serialized relationships from this part
    /// Uses SmallVec for efficient storage of typically small relationship collections
    pub srels: SmallVec<[SerializedRelationship; 8]>,
}

/// Serialized relationship as read from a .rels item.
///
/// Contains all relationship information in string form, before being
/// converted into Relationship objects with resolved part references.
#[derive(Debug, Clone)]
pub struct SerializedRelationship {
    /// Base URI for resolving relative references
    pub base_uri: String,

    /// Relationship ID (e.g., "rId1")
    pub r_id: String,

    /// Relationship type URI
    pub reltype: String,

    /// Target reference (relative URI or external URL)
    pub target_ref: String,

    /// Target mode (Internal or External)
    pub target_mode: String,
}

impl SerializedRelationship {
    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == target_mode::EXTERNAL
    }

    /// Get the target partname for internal relationships.
    ///
    /// Resolves the relative target reference against the base URI to
    /// produce an absolute PackURI.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external() {
            return Err(OpcError::ExternalRelationship(
                "cannot get target partname for external relationship".to_string(),
            ));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref)
    }
}

/// Content type map for looking up content types by part name or extension.
///
/// Implements the OPC content type discovery algorithm using Default and
/// Override elements from [Content_Types].xml.
struct ContentTypeMap {
    /// Maps file extensions to default content types
    defaults: HashMap<String, String>,

    /// Maps specific partnames to override content types
    overrides: HashMap<String, String>,
}

impl ContentTypeMap {
    fn new() -> Self {
        Self {
            defaults: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    /// Parse content types from [Content_Types].xml.
    fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"Default" => {
                        let mut extension = None;
                        let mut content_type = None;

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Extension" => {
                                    extension = Some(attr.unescape_value()?.to_string());
                                }
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                }
                                _ => {}
                            }
                        }

                        if let (Some(ext), Some(ct)) = (extension, content_type) {
                            map.defaults.insert(ext.to_lowercase(), ct);
                        }
                    }
                    b"Override" => {
                        let mut partname = None;
                        let mut content_type = None;

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"PartName" => {
                                    partname = Some(attr.unescape_value()?.to_string());
                                }
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                }
                                _ => {}
                            }
                        }

                        if let (Some(pn), Some(ct)) = (partname, content_type) {
                            map.overrides.insert(pn, ct);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "content types parse error: {}",
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(map)
    }

    /// Get the content type for a partname.
    ///
    /// An Override for the exact partname wins over the Default for its
    /// extension.
    fn get(&self, pack_uri: &PackURI) -> Result<String> {
        if let Some(ct) = self.overrides.get(pack_uri.as_str()) {
            return Ok(ct.clone());
        }

        let ext = pack_uri.ext().to_lowercase();
        if let Some(ct) = self.defaults.get(&ext) {
            return Ok(ct.clone());
        }

        Err(OpcError::ContentTypeNotFound(pack_uri.to_string()))
    }
}

/// Package reader that provides access to serialized parts and relationships.
///
/// This is the entry point for reading OPC packages. It parses the package
/// structure once and then exposes flat iterators over the serialized parts
/// and relationship records for the unmarshaller.
pub struct PackageReader {
    /// Package-level relationships
    pkg_srels: SmallVec<[SerializedRelationship; 8]>,

    /// All serialized parts in the package
    sparts: Vec<SerializedPart>,
}

impl PackageReader {
    /// Open and parse an OPC package from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_phys(PhysPkgReader::open(path)?)
    }

    /// Open and parse an OPC package from in-memory bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_phys(PhysPkgReader::from_bytes(data)?)
    }

    /// Parse the package structure out of a physical reader.
    ///
    /// Walks the relationship graph starting at the package root, loading
    /// every reachable part. External relationships are recorded but not
    /// followed. A referenced member missing from the archive fails the load.
    fn from_phys(mut phys_reader: PhysPkgReader) -> Result<Self> {
        let content_types = ContentTypeMap::from_xml(phys_reader.content_types_xml()?)?;

        let package_uri = PackURI::new(PACKAGE_URI)?;
        let pkg_srels = Self::load_srels(&phys_reader, &package_uri)?;

        let mut sparts = Vec::with_capacity(phys_reader.len());
        let mut visited: HashSet<String> = HashSet::with_capacity(phys_reader.len());
        let mut work_queue: Vec<PackURI> = Vec::with_capacity(pkg_srels.len());

        for srel in &pkg_srels {
            if srel.is_external() {
                continue;
            }
            let partname = srel.target_partname()?;
            if visited.insert(partname.to_string()) {
                work_queue.push(partname);
            }
        }

        while let Some(partname) = work_queue.pop() {
            let srels = Self::load_srels(&phys_reader, &partname)?;

            for srel in &srels {
                if srel.is_external() {
                    continue;
                }
                let child_partname = srel.target_partname()?;
                if visited.insert(child_partname.to_string()) {
                    work_queue.push(child_partname);
                }
            }

            let blob = phys_reader.take_blob(&partname)?;
            let content_type = content_types.get(&partname)?;

            sparts.push(SerializedPart {
                partname,
                content_type,
                blob,
                srels,
            });
        }

        Ok(Self { pkg_srels, sparts })
    }

    /// Load the serialized relationships for a source URI, or an empty
    /// collection when the source has no .rels item.
    fn load_srels(
        phys_reader: &PhysPkgReader,
        source_uri: &PackURI,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        match phys_reader.rels_xml_for(source_uri)? {
            Some(rels_xml) => Self::parse_rels_xml(rels_xml, source_uri.base_uri()),
            None => Ok(SmallVec::new()),
        }
    }

    /// Parse relationships XML into SerializedRelationship records.
    fn parse_rels_xml(
        rels_xml: &[u8],
        base_uri: &str,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        let mut srels = SmallVec::new();
        let mut reader = Reader::from_reader(rels_xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"Relationship" {
                        let mut r_id = None;
                        let mut reltype = None;
                        let mut target_ref = None;
                        let mut target_mode = target_mode::INTERNAL.to_string();

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Id" => r_id = Some(attr.unescape_value()?.to_string()),
                                b"Type" => reltype = Some(attr.unescape_value()?.to_string()),
                                b"Target" => target_ref = Some(attr.unescape_value()?.to_string()),
                                b"TargetMode" => target_mode = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }

                        if let (Some(id), Some(rt), Some(tr)) = (r_id, reltype, target_ref) {
                            srels.push(SerializedRelationship {
                                base_uri: base_uri.to_string(),
                                r_id: id,
                                reltype: rt,
                                target_ref: tr,
                                target_mode,
                            });
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpcError::XmlError(format!("rels parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        Ok(srels)
    }

    /// Get an iterator over all serialized parts.
    pub fn iter_sparts(&self) -> impl Iterator<Item = &SerializedPart> {
        self.sparts.iter()
    }

    /// Mutable iteration over the serialized parts, so callers can take
    /// ownership of the blobs without cloning.
    pub(crate) fn iter_sparts_mut(&mut self) -> impl Iterator<Item = &mut SerializedPart> {
        self.sparts.iter_mut()
    }

    /// Get the package-level relationships.
    pub fn pkg_srels(&self) -> &[SerializedRelationship] {
        &self.pkg_srels
    }

    /// Iterate over every serialized relationship, flattened and paired with
    /// its source URI. The package root is denoted by "/".
    pub fn iter_srels(&self) -> impl Iterator<Item = (&str, &SerializedRelationship)> {
        self.pkg_srels
            .iter()
            .map(|srel| (PACKAGE_URI, srel))
            .chain(self.sparts.iter().flat_map(|spart| {
                spart
                    .srels
                    .iter()
                    .map(move |srel| (spart.partname.as_str(), srel))
            }))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(
        pkg_srels: SmallVec<[SerializedRelationship; 8]>,
        sparts: Vec<SerializedPart>,
    ) -> Self {
        Self { pkg_srels, sparts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_pkg::PhysPkgWriter;

    const CONTENT_TYPES_XML: &[u8] = br#"<?xml version="1.0"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Default Extension="PNG" ContentType="image/png"/>
    <Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
</Types>"#;

    #[test]
    fn test_content_type_map() {
        let ct_map = ContentTypeMap::from_xml(CONTENT_TYPES_XML).unwrap();

        let uri = PackURI::new("/test.xml").unwrap();
        assert_eq!(ct_map.get(&uri).unwrap(), "application/xml");

        // Override wins over the extension default
        let uri = PackURI::new("/ppt/presentation.xml").unwrap();
        assert_eq!(
            ct_map.get(&uri).unwrap(),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"
        );

        // Extension matching is case-insensitive
        let uri = PackURI::new("/ppt/media/image1.png").unwrap();
        assert_eq!(ct_map.get(&uri).unwrap(), "image/png");

        let uri = PackURI::new("/unknown.bin").unwrap();
        assert!(matches!(
            ct_map.get(&uri),
            Err(OpcError::ContentTypeNotFound(_))
        ));
    }

    #[test]
    fn test_parse_rels_xml() {
        let rels_xml = br#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://rt-slide" Target="slides/slide1.xml"/>
    <Relationship Id="rId2" Type="http://rt-hyperlink" Target="http://some/link" TargetMode="External"/>
</Relationships>"#;

        let srels = PackageReader::parse_rels_xml(rels_xml, "/ppt").unwrap();
        assert_eq!(srels.len(), 2);

        assert_eq!(srels[0].r_id, "rId1");
        assert!(!srels[0].is_external());
        assert_eq!(
            srels[0].target_partname().unwrap().as_str(),
            "/ppt/slides/slide1.xml"
        );

        assert!(srels[1].is_external());
        assert_eq!(srels[1].target_ref, "http://some/link");
        assert!(matches!(
            srels[1].target_partname(),
            Err(OpcError::ExternalRelationship(_))
        ));
    }

    fn minimal_package() -> Vec<u8> {
        let mut writer = PhysPkgWriter::new();
        let write = |writer: &mut PhysPkgWriter, uri: &str, blob: &[u8]| {
            writer.write(&PackURI::new(uri).unwrap(), blob).unwrap();
        };

        write(&mut writer, "/[Content_Types].xml", CONTENT_TYPES_XML);
        write(
            &mut writer,
            "/_rels/.rels",
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://rt-officeDocument" Target="ppt/presentation.xml"/>
</Relationships>"#,
        );
        write(
            &mut writer,
            "/ppt/_rels/presentation.xml.rels",
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://rt-slide" Target="slides/slide1.xml"/>
</Relationships>"#,
        );
        write(&mut writer, "/ppt/presentation.xml", b"<p:presentation/>");
        write(&mut writer, "/ppt/slides/slide1.xml", b"<p:sld/>");
        // Unreferenced member, must not be loaded as a part
        write(&mut writer, "/docProps/thumbnail.png", b"\x89PNG");

        writer.finish().unwrap()
    }

    #[test]
    fn test_reader_walks_relationship_graph() {
        let pkg_reader = PackageReader::from_bytes(&minimal_package()).unwrap();

        let mut partnames: Vec<&str> = pkg_reader
            .iter_sparts()
            .map(|spart| spart.partname.as_str())
            .collect();
        partnames.sort_unstable();
        assert_eq!(
            partnames,
            vec!["/ppt/presentation.xml", "/ppt/slides/slide1.xml"]
        );

        assert_eq!(pkg_reader.pkg_srels().len(), 1);

        let srels: Vec<(&str, &SerializedRelationship)> = pkg_reader.iter_srels().collect();
        assert_eq!(srels.len(), 2);
        assert_eq!(srels[0].0, "/");
        assert!(
            srels
                .iter()
                .any(|(source, _)| *source == "/ppt/presentation.xml")
        );
    }

    #[test]
    fn test_reader_fails_on_missing_member() {
        let mut writer = PhysPkgWriter::new();
        writer
            .write(
                &PackURI::new("/[Content_Types].xml").unwrap(),
                CONTENT_TYPES_XML,
            )
            .unwrap();
        writer
            .write(
                &PackURI::new("/_rels/.rels").unwrap(),
                br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://rt-officeDocument" Target="ppt/presentation.xml"/>
</Relationships>"#,
            )
            .unwrap();

        let outcome = PackageReader::from_bytes(&writer.finish().unwrap());
        assert!(matches!(outcome, Err(OpcError::PartNotFound(_))));
    }

    #[test]
    fn test_reader_fails_without_content_types() {
        let mut writer = PhysPkgWriter::new();
        writer
            .write(&PackURI::new("/ppt/presentation.xml").unwrap(), b"<p/>")
            .unwrap();

        let outcome = PackageReader::from_bytes(&writer.finish().unwrap());
        assert!(matches!(outcome, Err(OpcError::PartNotFound(_))));
    }
}
