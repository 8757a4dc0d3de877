//! Objects that implement reading and writing OPC packages.
//!
//! This module provides the main OpcPackage type, the aggregate root of the
//! in-memory package model. A package owns its root relationship collection
//! directly and every part transitively, through the relationship graph: a
//! part is alive exactly as long as some relationship in the graph reaches it.
//! The graph is not a tree; cross-references and diamonds are legal.

use crate::error::{OpcError, Result};
use crate::packuri::{PACKAGE_URI, PackURI};
use crate::part::{Part, PartFactory, SharedPart};
use crate::pkgreader::{PackageReader, SerializedRelationship};
use crate::pkgwriter::PackageWriter;
use crate::rel::{Relationship, Relationships, Target};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::{Rc, Weak};

#[derive(Debug)]
struct PackageCore {
    /// Package-level relationships, base URI fixed to the package root
    rels: Relationships,
}

/// Main API class for working with OPC packages.
///
/// OpcPackage is a cheap cloneable handle; clones refer to the same package.
/// Parts hold a non-owning `PackageRef` back to it, handed out at part
/// construction via `downgrade`.
#[derive(Debug, Clone)]
pub struct OpcPackage {
    core: Rc<RefCell<PackageCore>>,
}

/// Non-owning reference from a part back to its package.
#[derive(Debug, Clone, Default)]
pub struct PackageRef {
    core: Weak<RefCell<PackageCore>>,
}

impl PackageRef {
    /// Get the package this reference points to, if it is still alive.
    pub fn upgrade(&self) -> Option<OpcPackage> {
        self.core.upgrade().map(|core| OpcPackage { core })
    }
}

impl OpcPackage {
    /// Create a new empty OPC package.
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(PackageCore {
                rels: Relationships::new(PACKAGE_URI.to_string()),
            })),
        }
    }

    /// Open an OPC package from a file.
    ///
    /// # Example
    /// ```no_run
    /// use longan::OpcPackage;
    ///
    /// let pkg = OpcPackage::open("presentation.pptx").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(pkg_file: P) -> Result<Self> {
        Self::open_with_factory(pkg_file, &PartFactory::new())
    }

    /// Open an OPC package from a file, constructing parts through the
    /// given factory.
    ///
    /// Custom part types registered with the factory are dispatched by
    /// content type during the load.
    pub fn open_with_factory<P: AsRef<Path>>(
        pkg_file: P,
        part_factory: &PartFactory,
    ) -> Result<Self> {
        let pkg_reader = PackageReader::from_file(pkg_file)?;
        let package = Self::new();
        Unmarshaller::unmarshal(pkg_reader, &package, part_factory)?;
        Ok(package)
    }

    /// Open an OPC package from an in-memory container.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_factory(data, &PartFactory::new())
    }

    /// Open an OPC package from an in-memory container, constructing parts
    /// through the given factory.
    pub fn from_bytes_with_factory(data: &[u8], part_factory: &PartFactory) -> Result<Self> {
        let pkg_reader = PackageReader::from_bytes(data)?;
        let package = Self::new();
        Unmarshaller::unmarshal(pkg_reader, &package, part_factory)?;
        Ok(package)
    }

    /// Get a non-owning reference to this package, for part back-references.
    pub fn downgrade(&self) -> PackageRef {
        PackageRef {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Get read access to the package-level relationships.
    pub fn rels(&self) -> Ref<'_, Relationships> {
        Ref::map(self.core.borrow(), |core| &core.rels)
    }

    /// Get mutable access to the package-level relationships.
    pub fn rels_mut(&self) -> RefMut<'_, Relationships> {
        RefMut::map(self.core.borrow_mut(), |core| &mut core.rels)
    }

    /// Attach a package-level relationship with a known rId, without the
    /// idempotent lookup. Used during unmarshalling.
    pub fn load_rel(&self, reltype: &str, target: Target, r_id: &str) -> Relationship {
        self.core
            .borrow_mut()
            .rels
            .add_relationship(reltype, target, r_id)
            .clone()
    }

    /// Relate the package to a part, creating or reusing a root relationship.
    ///
    /// Returns the relationship ID.
    pub fn relate_to(&self, part: &SharedPart, reltype: &str) -> String {
        self.core
            .borrow_mut()
            .rels
            .get_or_add(reltype, part)
            .r_id()
            .to_string()
    }

    /// Get the part related to the package by a root relationship of `reltype`.
    pub fn part_related_by(&self, reltype: &str) -> Result<SharedPart> {
        self.core.borrow().rels.part_with_reltype(reltype)
    }

    /// Get the main document part of this package.
    ///
    /// For a presentation this is the presentation part, for a spreadsheet
    /// the workbook part, and so on.
    pub fn main_document_part(&self) -> Result<SharedPart> {
        self.part_related_by(crate::constants::relationship_type::OFFICE_DOCUMENT)
    }

    /// Iterate over the parts of this package.
    ///
    /// The walk starts from the root relationships and follows each visited
    /// part's own relationships, yielding every reachable part exactly once.
    /// Each call re-walks the live graph, so mutations made since a previous
    /// call are reflected.
    pub fn iter_parts(&self) -> PartIter {
        PartIter::new(&self.core.borrow().rels)
    }

    /// Get all parts of this package as a vector.
    pub fn parts(&self) -> Vec<SharedPart> {
        self.iter_parts().collect()
    }

    /// Iterate over every relationship of this package.
    ///
    /// Yields the root relationships and each visited part's relationships,
    /// each relationship exactly once.
    pub fn iter_rels(&self) -> impl Iterator<Item = Relationship> {
        let mut rels: Vec<Relationship> = self.core.borrow().rels.iter().cloned().collect();
        for part in self.iter_parts() {
            rels.extend(part.borrow().rels().iter().cloned());
        }
        rels.into_iter()
    }

    /// Find the next available partname for a numbered-part template.
    ///
    /// The template carries a single `%d` placeholder, e.g.
    /// "/ppt/slides/slide%d.xml". The used numbers are collected from the
    /// existing partnames matching the template and the smallest positive
    /// integer not in use is returned, so gaps left by removed parts are
    /// filled first.
    pub fn next_partname(&self, template: &str) -> Result<PackURI> {
        let mut split = template.splitn(2, "%d");
        let (prefix, suffix) = match (split.next(), split.next()) {
            (Some(prefix), Some(suffix)) if !suffix.contains("%d") => (prefix, suffix),
            _ => {
                return Err(OpcError::InvalidPackUri(format!(
                    "partname template must contain a single '%d', got '{}'",
                    template
                )));
            }
        };

        let mut used_numbers: HashSet<u32> = HashSet::new();
        for part in self.iter_parts() {
            let part = part.borrow();
            let partname = part.partname().as_str();
            if let Some(middle) = partname
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                && let Ok(num) = atoi_simd::parse::<u32, false, false>(middle.as_bytes())
            {
                used_numbers.insert(num);
            }
        }

        let mut num = 1u32;
        while used_numbers.contains(&num) {
            num += 1;
        }
        PackURI::new(format!("{}{}{}", prefix, num, suffix))
    }

    /// Save this package to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let rels = self.core.borrow().rels.clone();
        PackageWriter::write(path, &rels, &self.parts())
    }

    /// Serialize this package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rels = self.core.borrow().rels.clone();
        PackageWriter::to_bytes(&rels, &self.parts())
    }
}

impl Default for OpcPackage {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the reachable parts of a package.
///
/// Breadth-first walk seeded by the root relationships, deduplicated by
/// partname so parts reachable through multiple relationship paths are
/// yielded once.
pub struct PartIter {
    queue: VecDeque<SharedPart>,
    visited: HashSet<String>,
}

impl PartIter {
    fn new(root_rels: &Relationships) -> Self {
        let mut iter = Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
        };
        iter.enqueue_targets(root_rels);
        iter
    }

    fn enqueue_targets(&mut self, rels: &Relationships) {
        for rel in rels.iter() {
            if let Target::Part(part) = rel.target() {
                let partname = part.borrow().partname().to_string();
                if self.visited.insert(partname) {
                    self.queue.push_back(Rc::clone(part));
                }
            }
        }
    }
}

impl Iterator for PartIter {
    type Item = SharedPart;

    fn next(&mut self) -> Option<SharedPart> {
        let part = self.queue.pop_front()?;
        // Snapshot the relationships so enqueueing never overlaps a borrow
        // of the part being yielded
        let rels = part.borrow().rels().clone();
        self.enqueue_targets(&rels);
        Some(part)
    }
}

/// Reconstructs a package object graph from a package reader.
///
/// Stateless; all operations are associated functions. Parts are constructed
/// in a first pass and relationships wired in a second, so relationship
/// records never encounter a target that has not been constructed yet,
/// regardless of the order the reader yields them in.
pub struct Unmarshaller;

impl Unmarshaller {
    /// Construct the graph held in `pkg_reader` into `package`.
    pub fn unmarshal(
        mut pkg_reader: PackageReader,
        package: &OpcPackage,
        part_factory: &PartFactory,
    ) -> Result<()> {
        let parts = Self::unmarshal_parts(&mut pkg_reader, package, part_factory)?;
        Self::unmarshal_relationships(&pkg_reader, package, &parts)?;
        Ok(())
    }

    /// First pass: construct every part, keyed by partname, relationships
    /// not yet wired.
    fn unmarshal_parts(
        pkg_reader: &mut PackageReader,
        package: &OpcPackage,
        part_factory: &PartFactory,
    ) -> Result<HashMap<String, SharedPart>> {
        let mut parts = HashMap::new();
        for spart in pkg_reader.iter_sparts_mut() {
            let blob = std::mem::take(&mut spart.blob);
            let part = part_factory.load(
                spart.partname.clone(),
                spart.content_type.clone(),
                blob,
                package.downgrade(),
            )?;
            parts.insert(spart.partname.to_string(), part);
        }
        Ok(parts)
    }

    /// Second pass: resolve each serialized relationship's source and target
    /// and wire it onto the package or the owning part.
    fn unmarshal_relationships(
        pkg_reader: &PackageReader,
        package: &OpcPackage,
        parts: &HashMap<String, SharedPart>,
    ) -> Result<()> {
        for (source_uri, srel) in pkg_reader.iter_srels() {
            let target = Self::resolve_target(srel, parts)?;
            if source_uri == PACKAGE_URI {
                package.load_rel(&srel.reltype, target, &srel.r_id);
            } else {
                let source = parts.get(source_uri).ok_or_else(|| {
                    OpcError::DataIntegrity(format!(
                        "relationship source part '{}' not present in package",
                        source_uri
                    ))
                })?;
                source.borrow_mut().load_rel(&srel.reltype, target, &srel.r_id);
            }
        }
        Ok(())
    }

    fn resolve_target(
        srel: &SerializedRelationship,
        parts: &HashMap<String, SharedPart>,
    ) -> Result<Target> {
        if srel.is_external() {
            return Ok(Target::External(srel.target_ref.clone()));
        }
        let target_partname = srel.target_partname()?;
        let part = parts.get(target_partname.as_str()).ok_or_else(|| {
            OpcError::DataIntegrity(format!(
                "relationship target part '{}' not present in package",
                target_partname
            ))
        })?;
        Ok(Target::Part(Rc::clone(part)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{relationship_type as rt, target_mode};
    use crate::part::{BlobPart, Part};
    use smallvec::smallvec;

    fn blob_part(partname: &str) -> SharedPart {
        BlobPart::load(
            PackURI::new(partname).unwrap(),
            "content/type".to_string(),
            Vec::new(),
            Default::default(),
        )
        .unwrap()
    }

    fn srel(base_uri: &str, r_id: &str, target_ref: &str, external: bool) -> SerializedRelationship {
        SerializedRelationship {
            base_uri: base_uri.to_string(),
            r_id: r_id.to_string(),
            reltype: "http://reltype".to_string(),
            target_ref: target_ref.to_string(),
            target_mode: if external {
                target_mode::EXTERNAL.to_string()
            } else {
                target_mode::INTERNAL.to_string()
            },
        }
    }

    #[test]
    fn test_load_rel_and_relate_to() {
        let package = OpcPackage::new();
        let slide = blob_part("/ppt/slides/slide1.xml");

        let rel = package.load_rel("http://rt-slide", Target::Part(Rc::clone(&slide)), "rId99");
        assert_eq!(rel.r_id(), "rId99");

        // relate_to reuses the loaded relationship
        let r_id = package.relate_to(&slide, "http://rt-slide");
        assert_eq!(r_id, "rId99");
        assert_eq!(package.rels().len(), 1);
    }

    #[test]
    fn test_part_related_by() {
        let package = OpcPackage::new();
        let pres = blob_part("/ppt/presentation.xml");
        package.relate_to(&pres, rt::OFFICE_DOCUMENT);

        let found = package.part_related_by(rt::OFFICE_DOCUMENT).unwrap();
        assert!(Rc::ptr_eq(&found, &pres));
        assert!(package.part_related_by(rt::SLIDE).is_err());
    }

    #[test]
    fn test_iter_parts_visits_diamond_once() {
        // package --> part_1 --> shared
        //         \-> part_2 --/
        let package = OpcPackage::new();
        let part_1 = blob_part("/ppt/slides/slide1.xml");
        let part_2 = blob_part("/ppt/slides/slide2.xml");
        let shared = blob_part("/ppt/media/image1.png");

        package.relate_to(&part_1, "http://rt-slide");
        package.relate_to(&part_2, "http://rt-slide");
        part_1.borrow_mut().relate_to(&shared, "http://rt-image");
        part_2.borrow_mut().relate_to(&shared, "http://rt-image");

        let parts = package.parts();
        assert_eq!(parts.len(), 3);
        let shared_count = parts.iter().filter(|p| Rc::ptr_eq(p, &shared)).count();
        assert_eq!(shared_count, 1);
    }

    #[test]
    fn test_iter_parts_reflects_mutation() {
        let package = OpcPackage::new();
        let part_1 = blob_part("/ppt/slides/slide1.xml");
        package.relate_to(&part_1, "http://rt-slide");
        assert_eq!(package.parts().len(), 1);

        let part_2 = blob_part("/ppt/slides/slide2.xml");
        part_1.borrow_mut().relate_to(&part_2, "http://rt-slide");
        assert_eq!(package.parts().len(), 2);
    }

    #[test]
    fn test_iter_rels_visits_each_relationship_once() {
        let package = OpcPackage::new();
        let part_1 = blob_part("/ppt/slides/slide1.xml");
        let part_2 = blob_part("/ppt/slides/slide2.xml");

        package.relate_to(&part_1, "http://rt-slide");
        package.relate_to(&part_2, "http://rt-slide");
        part_1.borrow_mut().relate_to(&part_2, "http://rt-next");
        part_2.borrow_mut().relate_to(&part_1, "http://rt-prev");
        part_1
            .borrow_mut()
            .relate_to_ext("http://some/link", "http://rt-hyperlink");

        let rels: Vec<Relationship> = package.iter_rels().collect();
        assert_eq!(rels.len(), 5);
    }

    #[test]
    fn test_next_partname() {
        let package = OpcPackage::new();
        for n in [1u32, 2] {
            let part = blob_part(&format!("/foo/bar/baz{}.xml", n));
            package.relate_to(&part, "http://rt-baz");
        }
        assert_eq!(
            package.next_partname("/foo/bar/baz%d.xml").unwrap().as_str(),
            "/foo/bar/baz3.xml"
        );

        let package = OpcPackage::new();
        for n in [2u32, 3] {
            let part = blob_part(&format!("/foo/bar/baz{}.xml", n));
            package.relate_to(&part, "http://rt-baz");
        }
        assert_eq!(
            package.next_partname("/foo/bar/baz%d.xml").unwrap().as_str(),
            "/foo/bar/baz1.xml"
        );

        assert_eq!(
            OpcPackage::new()
                .next_partname("/foo/bar/baz%d.xml")
                .unwrap()
                .as_str(),
            "/foo/bar/baz1.xml"
        );
        assert!(OpcPackage::new().next_partname("/foo/bar/baz.xml").is_err());
    }

    #[test]
    fn test_package_ref_round_trip() {
        let package = OpcPackage::new();
        let part = BlobPart::load(
            PackURI::new("/ppt/presentation.xml").unwrap(),
            "content/type".to_string(),
            Vec::new(),
            package.downgrade(),
        )
        .unwrap();

        let upgraded = part.borrow().package().upgrade().unwrap();
        assert!(Rc::ptr_eq(&upgraded.core, &package.core));
    }

    #[test]
    fn test_unmarshal_wires_parts_and_relationships() {
        let pkg_reader = PackageReader::from_raw(
            smallvec![srel("/", "rId1", "part1.xml", false)],
            vec![
                crate::pkgreader::SerializedPart {
                    partname: PackURI::new("/part1.xml").unwrap(),
                    content_type: "application/xml".to_string(),
                    blob: b"<root1/>".to_vec(),
                    srels: smallvec![
                        srel("/", "rId1", "part2.xml", false),
                        srel("/", "rId2", "http://external/link", true),
                    ],
                },
                crate::pkgreader::SerializedPart {
                    partname: PackURI::new("/part2.xml").unwrap(),
                    content_type: "application/xml".to_string(),
                    blob: b"<root2/>".to_vec(),
                    srels: smallvec![],
                },
            ],
        );

        let package = OpcPackage::new();
        Unmarshaller::unmarshal(pkg_reader, &package, &PartFactory::new()).unwrap();

        let part_1 = package.part_related_by("http://reltype").unwrap();
        assert_eq!(part_1.borrow().partname().as_str(), "/part1.xml");

        let part_2 = part_1.borrow().part_related_by("http://reltype").unwrap();
        assert_eq!(part_2.borrow().partname().as_str(), "/part2.xml");
        assert_eq!(
            part_1.borrow().target_ref("rId2").unwrap(),
            "http://external/link"
        );

        assert_eq!(package.parts().len(), 2);
    }

    #[test]
    fn test_unmarshal_fails_on_dangling_target() {
        let pkg_reader = PackageReader::from_raw(
            smallvec![srel("/", "rId1", "missing.xml", false)],
            vec![],
        );

        let package = OpcPackage::new();
        let outcome = Unmarshaller::unmarshal(pkg_reader, &package, &PartFactory::new());
        assert!(matches!(outcome, Err(OpcError::DataIntegrity(_))));
    }

    // --- end-to-end fixtures and round trips ---

    use crate::constants::content_type as ct;
    use crate::part::XmlPart;
    use crate::phys_pkg::PhysPkgWriter;

    fn write_member(writer: &mut PhysPkgWriter, uri: &str, blob: &[u8]) {
        writer.write(&PackURI::new(uri).unwrap(), blob).unwrap();
    }

    fn minimal_pptx() -> Vec<u8> {
        let mut writer = PhysPkgWriter::new();

        write_member(
            &mut writer,
            "/[Content_Types].xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="{}"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
  <Override PartName="/ppt/presentation.xml" ContentType="{}"/>
  <Override PartName="/ppt/slides/slide1.xml" ContentType="{}"/>
</Types>"#,
                ct::OPC_RELATIONSHIPS,
                ct::PML_PRESENTATION_MAIN,
                ct::PML_SLIDE,
            )
            .as_bytes(),
        );
        write_member(
            &mut writer,
            "/_rels/.rels",
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="{}" Target="ppt/presentation.xml"/>
</Relationships>"#,
                rt::OFFICE_DOCUMENT,
            )
            .as_bytes(),
        );
        write_member(
            &mut writer,
            "/ppt/presentation.xml",
            b"<p:presentation><p:sldIdLst/></p:presentation>",
        );
        write_member(
            &mut writer,
            "/ppt/_rels/presentation.xml.rels",
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="{}" Target="slides/slide1.xml"/>
</Relationships>"#,
                rt::SLIDE,
            )
            .as_bytes(),
        );
        write_member(
            &mut writer,
            "/ppt/slides/slide1.xml",
            b"<p:sld><a:t>Hello</a:t></p:sld>",
        );
        write_member(
            &mut writer,
            "/ppt/slides/_rels/slide1.xml.rels",
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="{}" Target="../media/image1.png"/>
  <Relationship Id="rId2" Type="{}" Target="https://example.com/" TargetMode="External"/>
</Relationships>"#,
                rt::IMAGE,
                rt::HYPERLINK,
            )
            .as_bytes(),
        );
        write_member(&mut writer, "/ppt/media/image1.png", b"\x89PNG\r\n");

        writer.finish().unwrap()
    }

    #[test]
    fn test_open_package_from_bytes() {
        let package = OpcPackage::from_bytes(&minimal_pptx()).unwrap();
        assert_eq!(package.parts().len(), 3);

        let pres = package.main_document_part().unwrap();
        assert_eq!(pres.borrow().content_type(), ct::PML_PRESENTATION_MAIN);
        assert!(pres.borrow().as_any().downcast_ref::<XmlPart>().is_some());

        let slide = pres.borrow().part_related_by(rt::SLIDE).unwrap();
        let image = slide.borrow().part_related_by(rt::IMAGE).unwrap();
        assert_eq!(image.borrow().blob().as_ref(), b"\x89PNG\r\n");
        assert!(image.borrow().as_any().downcast_ref::<BlobPart>().is_some());

        assert_eq!(
            slide.borrow().target_ref("rId2").unwrap(),
            "https://example.com/"
        );

        assert!(image.borrow().package().upgrade().is_some());
    }

    #[test]
    fn test_save_and_reopen_round_trip() {
        let package = OpcPackage::new();

        let pres = XmlPart::load(
            PackURI::new("/ppt/presentation.xml").unwrap(),
            ct::PML_PRESENTATION_MAIN.to_string(),
            b"<p:presentation><p:sldIdLst/></p:presentation>".to_vec(),
            package.downgrade(),
        )
        .unwrap();
        package.relate_to(&pres, rt::OFFICE_DOCUMENT);

        let slide = XmlPart::load(
            PackURI::new("/ppt/slides/slide1.xml").unwrap(),
            ct::PML_SLIDE.to_string(),
            b"<p:sld><a:t>Hello</a:t></p:sld>".to_vec(),
            package.downgrade(),
        )
        .unwrap();
        pres.borrow_mut().relate_to(&slide, rt::SLIDE);

        let image = BlobPart::load(
            PackURI::new("/ppt/media/image1.png").unwrap(),
            "image/png".to_string(),
            b"\x89PNG\r\n".to_vec(),
            package.downgrade(),
        )
        .unwrap();
        slide.borrow_mut().relate_to(&image, rt::IMAGE);
        let url = "https://github.com/DevExzh/longan";
        slide.borrow_mut().relate_to_ext(url, rt::HYPERLINK);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pptx");
        package.save(&path).unwrap();

        let reopened = OpcPackage::open(&path).unwrap();
        assert_eq!(reopened.parts().len(), 3);

        let pres = reopened.main_document_part().unwrap();
        let slide = pres.borrow().part_related_by(rt::SLIDE).unwrap();
        assert_eq!(slide.borrow().content_type(), ct::PML_SLIDE);

        let image = slide.borrow().part_related_by(rt::IMAGE).unwrap();
        assert_eq!(image.borrow().blob().as_ref(), b"\x89PNG\r\n");

        let slide_ref = slide.borrow();
        let xml_part = slide_ref.as_any().downcast_ref::<XmlPart>().unwrap();
        assert_eq!(xml_part.element().children()[0].text(), "Hello");

        let ext_ref = slide_ref
            .rels()
            .iter()
            .find(|rel| rel.is_external())
            .map(|rel| rel.target_ref());
        assert_eq!(ext_ref.as_deref(), Some(url));
    }

    #[test]
    fn test_open_with_factory_dispatches_registered_type() {
        let mut factory = PartFactory::new();
        // Keep slide XML as raw bytes instead of a parsed tree
        factory.register(ct::PML_SLIDE, BlobPart::load);

        let package = OpcPackage::from_bytes_with_factory(&minimal_pptx(), &factory).unwrap();
        let pres = package.main_document_part().unwrap();
        let slide = pres.borrow().part_related_by(rt::SLIDE).unwrap();

        assert!(slide.borrow().as_any().downcast_ref::<BlobPart>().is_some());
        assert_eq!(
            slide.borrow().blob().as_ref(),
            b"<p:sld><a:t>Hello</a:t></p:sld>"
        );
    }

    #[test]
    fn test_partname_change_survives_round_trip() {
        let package = OpcPackage::from_bytes(&minimal_pptx()).unwrap();

        let pres = package.main_document_part().unwrap();
        let slide = pres.borrow().part_related_by(rt::SLIDE).unwrap();
        let image = slide.borrow().part_related_by(rt::IMAGE).unwrap();

        image
            .borrow_mut()
            .set_partname(PackURI::new("/ppt/media/image2.png").unwrap());

        let reopened = OpcPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();
        let pres = reopened.main_document_part().unwrap();
        let slide = pres.borrow().part_related_by(rt::SLIDE).unwrap();
        let image = slide.borrow().part_related_by(rt::IMAGE).unwrap();
        assert_eq!(image.borrow().partname().as_str(), "/ppt/media/image2.png");
    }
}
