use crate::{Target, compile_file};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

/// Compiles a PlantUML-style statechart into an executable hierarchical state machine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path of the statechart description
    #[arg(value_hint = clap::ValueHint::FilePath)]
    input: PathBuf,
    /// Directory the generated file is written to (created if missing)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    output_dir: PathBuf,
    /// Do not report warnings
    #[arg(long, default_value = "false")]
    no_warnings: bool,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Target::Python)]
    target: Target,
}

impl Cli {
    /// Runs the compiler, returning the path of the generated file.
    ///
    /// The file is named after the statechart and only written if compilation succeeds.
    pub fn run(&self) -> anyhow::Result<PathBuf> {
        let compiled = compile_file(&self.input, self.target)
            .with_context(|| format!("failed to compile '{}'", self.input.display()))?;
        if !self.no_warnings {
            for warning in &compiled.warnings {
                warn!("{}: {warning}", self.input.display());
            }
        }
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create directory '{}'", self.output_dir.display())
        })?;
        let output = self
            .output_dir
            .join(format!("{}.{}", compiled.name, compiled.extension));
        std::fs::write(&output, compiled.code)
            .with_context(|| format!("failed to write '{}'", output.display()))?;
        info!("generated '{}'", output.display());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments() {
        let cli = Cli::parse_from(["hsmgen", "in.puml", "out"]);
        assert_eq!(cli.target, Target::Python);
        assert!(!cli.no_warnings);
        let cli = Cli::parse_from(["hsmgen", "in.puml", "out", "--no-warnings", "-t", "json"]);
        assert_eq!(cli.target, Target::Json);
        assert!(cli.no_warnings);
        assert!(Cli::try_parse_from(["hsmgen", "in.puml"]).is_err());
        assert!(Cli::try_parse_from(["hsmgen", "in.puml", "out", "-t", "cpp"]).is_err());
    }
}
