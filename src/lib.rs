//! Longan - Open Packaging Conventions (OPC) container layer for OOXML documents
//!
//! This library implements the OPC package model underlying the Office Open XML
//! file formats (.docx, .xlsx, .pptx): a ZIP-based container holding XML parts
//! connected by typed relationships, plus a content-type map.
//!
//! # Features
//!
//! - **In-memory package model**: parts and relationships as a live object graph
//! - **Relationship management**: typed, identified edges with automatic rId
//!   allocation and idempotent get-or-add semantics
//! - **Two-pass unmarshalling**: all parts are constructed before any
//!   relationship is wired, so forward references never fail
//! - **Content type discovery**: Default/Override resolution per the OPC
//!   specification
//! - **Round-trip serialization**: packages open, mutate, and save back to
//!   container form
//!
//! # Example - Opening a package
//!
//! ```no_run
//! use longan::{OpcPackage, Part};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pkg = OpcPackage::open("presentation.pptx")?;
//!
//! for part in pkg.iter_parts() {
//!     let part = part.borrow();
//!     println!("{} ({})", part.partname(), part.content_type());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Authoring a package
//!
//! ```no_run
//! use longan::{BlobPart, OpcPackage, PackURI, relationship_type};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pkg = OpcPackage::new();
//!
//! let partname = PackURI::new("/ppt/media/image1.png")?;
//! let image = BlobPart::load(
//!     partname,
//!     "image/png".to_string(),
//!     std::fs::read("logo.png")?,
//!     pkg.downgrade(),
//! )?;
//! pkg.relate_to(&image, relationship_type::IMAGE);
//!
//! pkg.save("out.pptx")?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod oxml;
pub mod package;
pub mod packuri;
pub mod part;
pub mod phys_pkg;
pub mod pkgreader;
pub mod pkgwriter;
pub mod rel;

// Re-export commonly used types
pub use constants::{content_type, namespace, relationship_type, target_mode};
pub use error::{OpcError, Result};
pub use oxml::{XmlElement, parse_xml, serialize_part_xml};
pub use package::{OpcPackage, PackageRef, PartIter, Unmarshaller};
pub use packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
pub use part::{BlobPart, Part, PartFactory, PartLoadFn, SharedPart, XmlPart};
pub use phys_pkg::{PhysPkgReader, PhysPkgWriter};
pub use pkgreader::{PackageReader, SerializedPart, SerializedRelationship};
pub use pkgwriter::PackageWriter;
pub use rel::{Relationship, Relationships, Target};
