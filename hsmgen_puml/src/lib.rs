//! Parser and AST builder for PlantUML-style statechart descriptions.
//!
//! The accepted language is the subset of PlantUML state diagrams covering
//! (possibly nested) states, initial and shallow history pseudostates,
//! transitions labeled by an event and a guard, and entry/exit actions:
//!
//! ```text
//! [*] --> Aus
//! Aus --> An : anschalten
//! state An {
//!     [*] --> Leerlauf
//!     Leerlauf --> Zubereitung : start
//!     Zubereitung --> Ausgabe : fertig [wasser > 0]
//! }
//! An --> Pause : stop
//! Pause --> An[H] : fortfahren
//! An: Entry: wasserReinigen
//! ```

mod builder;
mod parser;
mod scanner;

use std::path::Path;

use anyhow::Context;
pub use builder::PumlModel;
pub use hsmgen_core;
use log::info;
pub use parser::{ParserError, Warning};

/// Parses a statechart description into its (not yet validated) AST.
pub fn parse(source: &str, name: &str) -> Result<PumlModel, ParserError> {
    let lines = scanner::scan(source);
    builder::AstBuilder::build(&lines, name)
}

/// Reads and parses a statechart description file.
///
/// The statechart is named after the file stem, lower-cased.
pub fn load(path: &Path) -> anyhow::Result<PumlModel> {
    info!(target: "parser", "loading '{}'", path.display());
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_lowercase)
        .with_context(|| format!("invalid file name '{}'", path.display()))?;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    parse(&source, &name).with_context(|| format!("failed to parse '{}'", path.display()))
}
