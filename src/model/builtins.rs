//! Built-in Types
//!
//! Type descriptions compiled into the crate. The date, code and narrative
//! types are scanned on every run regardless of the requested roots.

use include_dir::{include_dir, Dir};
use std::path::Path;
use tracing::error;

use super::{loader::collect_embedded_files, ModelLibrary, TypeDef};

static BUILTIN_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/builtins");

pub const STRING_TYPE: &str = "model.primitive.StringDt";
pub const DATE_TYPE: &str = "model.primitive.DateDt";
pub const CODE_TYPE: &str = "model.primitive.CodeDt";
pub const XHTML_TYPE: &str = "model.primitive.XhtmlDt";
pub const NARRATIVE_TYPE: &str = "model.composite.NarrativeDt";
pub const RESOURCE_REFERENCE_TYPE: &str = "model.api.ResourceReferenceDt";

/// Abstract bases model types extend
pub const BASE_PRIMITIVE: &str = "model.api.BasePrimitive";
pub const BASE_COMPOSITE: &str = "model.api.BaseComposite";
pub const BASE_RESOURCE: &str = "model.api.BaseResource";
pub const BASE_RESOURCE_BLOCK: &str = "model.api.BaseResourceBlock";

/// Types added to every scan's roots
pub const ALWAYS_SCANNED: [&str; 3] = [NARRATIVE_TYPE, DATE_TYPE, CODE_TYPE];

/// Library holding only the built-in descriptions
pub fn library() -> ModelLibrary {
    let mut files: Vec<(&Path, &str)> = Vec::new();
    collect_embedded_files(&BUILTIN_DIR, &mut files);
    files.sort_by(|a, b| a.0.cmp(b.0));

    let mut library = ModelLibrary::new();
    let mut failures = Vec::new();
    for (path, content) in files {
        let defs: Vec<TypeDef> = match serde_json::from_str(content) {
            Ok(defs) => defs,
            Err(e) => {
                error!("Skipping malformed built-in description {}: {}", path.display(), e);
                failures.push(path.display().to_string());
                continue;
            }
        };
        for def in defs {
            if let Err(e) = library.insert(def) {
                error!("Skipping built-in description: {}", e);
                failures.push(e.to_string());
            }
        }
    }
    debug_assert!(failures.is_empty(), "broken built-in descriptions: {:?}", failures);
    library
}
