//! Ahead-of-time facades for forge models
//!
//! Reads YAML model definitions, compiles them with `forge-orm` and writes
//! one module per model with typed `where_<field>` predicates and relation
//! accessors, plus a `mod.rs` re-exporting them.

pub mod error;
pub mod generator;
pub mod templates;
pub mod writer;

pub use error::{CodegenError, CodegenResult};
pub use generator::*;
pub use writer::*;

use std::path::{Path, PathBuf};

use forge_orm::{ModelCompiler, ModelRegistry};
use tracing::info;

pub struct CodeGenerator {
    pub output_dir: PathBuf,
    writer: CodeWriter,
}

impl CodeGenerator {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            writer: CodeWriter::new(),
        }
    }

    /// Compiles every definition in `schema_dir` and writes the facades
    pub fn generate_dir(&self, schema_dir: &Path) -> CodegenResult<Vec<PathBuf>> {
        let registry = ModelCompiler::new().load_dir(schema_dir)?.compile()?;
        self.generate(&registry)
    }

    /// Writes one facade per model and the `mod.rs`. Returns the files
    /// whose content changed.
    pub fn generate(&self, registry: &ModelRegistry) -> CodegenResult<Vec<PathBuf>> {
        let mut written = Vec::new();

        for model in registry.iter() {
            let generator = FacadeGenerator::new(model);
            let path = self
                .output_dir
                .join(format!("{}.rs", generator.module_name()));
            if self
                .writer
                .write_preserving_markers(&path, &generator.render()?)?
            {
                written.push(path);
            }
        }

        let mod_path = self.output_dir.join("mod.rs");
        if self.writer.write_if_changed(&mod_path, &render_mod(registry)?)? {
            written.push(mod_path);
        }

        info!(
            "Generated facades for {} models into {} ({} files changed)",
            registry.len(),
            self.output_dir.display(),
            written.len()
        );
        Ok(written)
    }
}
