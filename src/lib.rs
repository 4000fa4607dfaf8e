//! hsmgen compiles textual statechart descriptions into executable hierarchical state machines.
//!
//! The pipeline runs entirely in memory:
//!
//! - the description is scanned and parsed into a statechart AST ([`hsmgen_puml`]);
//! - the AST is validated into a declarative [`Statechart`] table ([`hsmgen_core`]);
//! - the table is emitted for the selected [`Target`],
//!   either as a class-based Python state machine ([`hsmgen_python`]) or as JSON.
//!
//! The same table can also be executed directly with [`hsmgen_core::Machine`].

mod cli;

use anyhow::Context;
pub use cli::Cli;
pub use hsmgen_core;
use hsmgen_core::Statechart;
use hsmgen_puml::PumlModel;
pub use hsmgen_puml::Warning;
use log::info;
use std::path::Path;

/// Output format of the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    /// Class-based Python state machine.
    #[default]
    Python,
    /// Declarative JSON table of states and transitions.
    Json,
}

impl Target {
    /// Extension of the generated file.
    pub fn extension(self) -> &'static str {
        match self {
            Target::Python => "py",
            Target::Json => "json",
        }
    }
}

/// The result of a successful compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// Name of the statechart.
    pub name: String,
    /// Generated source code.
    pub code: String,
    /// Extension of the file the code is meant to be written to.
    pub extension: &'static str,
    /// Non-fatal anomalies found while parsing.
    pub warnings: Vec<Warning>,
}

fn validate(model: PumlModel) -> anyhow::Result<(Statechart, Vec<Warning>)> {
    let name = model.statechart.name().to_owned();
    let chart = model
        .statechart
        .build()
        .with_context(|| format!("invalid statechart '{name}'"))?;
    Ok((chart, model.warnings))
}

/// Parses and validates a statechart description.
pub fn statechart(source: &str, name: &str) -> anyhow::Result<(Statechart, Vec<Warning>)> {
    let model = hsmgen_puml::parse(source, name).context("failed to parse statechart")?;
    validate(model)
}

/// Compiles a statechart description into code for the given target.
///
/// Nothing is produced unless every stage succeeds.
pub fn compile(source: &str, name: &str, target: Target) -> anyhow::Result<Compiled> {
    let model = hsmgen_puml::parse(source, name).context("failed to parse statechart")?;
    emit(model, target)
}

/// Reads and compiles a statechart description file.
///
/// The statechart is named after the lower-cased file stem.
pub fn compile_file(path: &Path, target: Target) -> anyhow::Result<Compiled> {
    let model = hsmgen_puml::load(path)?;
    emit(model, target)
}

fn emit(model: PumlModel, target: Target) -> anyhow::Result<Compiled> {
    let name = model.statechart.name().to_owned();
    info!("compiling statechart '{name}' to {target:?}");
    let (chart, warnings) = validate(model)?;
    let code = match target {
        Target::Python => hsmgen_python::generate(&chart)
            .with_context(|| format!("failed to generate Python code for '{name}'"))?,
        Target::Json => {
            let mut json = serde_json::to_string_pretty(&chart)
                .with_context(|| format!("failed to serialize '{name}'"))?;
            json.push('\n');
            json
        }
    };
    Ok(Compiled {
        name,
        code,
        extension: target.extension(),
        warnings,
    })
}
