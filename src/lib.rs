//! FHIR Metamodel Scanner
//!
//! Turns a table of structural model type descriptions (resources, composite
//! and primitive datatypes, resource blocks and code tables) into a sealed,
//! cross-referenced runtime schema graph: one descriptor per type, each
//! listing its ordered children with cardinality, variant and links to the
//! descriptors of the types they reference.
//!
//! ## Features
//!
//! - **Table-driven**: type descriptions are plain data loaded from JSON
//! - **Cycle-safe discovery**: referenced types are scanned in rounds, never recursively
//! - **Deterministic**: identical inputs produce identical registries and fingerprints
//! - **Fail-fast**: any configuration error aborts the scan with no partial result
//!
//! ## Pipeline
//!
//! ```text
//! ModelLibrary ──► ModelScanner ──► classify ──► flatten ──► introspect
//!                      ▲                                        │
//!                      └──────────── discovered types ──────────┘
//!                      │
//!                      ▼
//!                 ModelRegistry (sealed)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use fhir_metamodel::{ModelLibrary, ModelScanner};
//!
//! let library = ModelLibrary::from_directory("model".as_ref())?;
//! let registry = ModelScanner::scan_all(&library)?;
//! if let Some(patient) = registry.resource_by_name("Patient") {
//!     for child in patient.children() {
//!         println!("{} {:?}", child.name(), child.order());
//!     }
//! }
//! # Ok::<(), fhir_metamodel::ConfigurationError>(())
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod registry;
pub mod scanner;

pub use config::ScannerConfig;
pub use descriptor::{
    ChildDescriptor, DescriptorKind, DescriptorRef, TypeDescriptor, TypeLink, UndeclaredExtensionDescriptor,
};
pub use error::{ConfigurationError, Result};
pub use model::{Capability, FieldDef, LoadConfig, ModelLibrary, TypeDef, TypeId};
pub use registry::{ModelRegistry, SearchResult};
pub use scanner::ModelScanner;
