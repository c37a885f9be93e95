use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, error, info};

use sanplan_api::{
    document::{Defaults, Document, SwitchRegistry},
    error::{InternalError, InvalidInputError, ReportError, SanplanError, SanplanResultExt},
    resolve, Resolution,
};

pub mod cli;

use cli::{InputArgs, OutputFormat};

pub const SANPLAN_VERSION: &str = match option_env!("SANPLAN_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

/// The parsed inputs of one resolution.
#[derive(Debug)]
pub struct Inputs {
    pub document: Document,
    pub defaults: Defaults,
    pub switches: SwitchRegistry,
}

impl Inputs {
    pub fn load(args: &InputArgs) -> Result<Self, SanplanError> {
        let document = read_input(&args.project, |path| InvalidInputError::LoadProject { path })
            .and_then(|text| Document::from_xml(&text))
            .message("Failed to load project document")?;

        let defaults = read_input(&args.defaults, |path| InvalidInputError::LoadDefaults { path })
            .and_then(|text| Defaults::parse(&text))
            .message("Failed to load defaults table")?;

        let switches = read_input(&args.switches, |path| InvalidInputError::LoadSwitches { path })
            .and_then(|text| SwitchRegistry::parse(&text))
            .message("Failed to load switch registry")?;

        Ok(Self {
            document,
            defaults,
            switches,
        })
    }

    pub fn resolve(&self) -> Result<Resolution, SanplanError> {
        resolve(&self.document, &self.defaults, &self.switches)
    }
}

fn read_input(
    path: &Path,
    kind: impl FnOnce(String) -> InvalidInputError,
) -> Result<String, SanplanError> {
    debug!("Reading '{}'", path.display());
    fs::read_to_string(path).structured(kind(path.display().to_string()))
}

/// Resolves the project and reports the outcome.
pub fn validate(args: &InputArgs) -> Result<(), SanplanError> {
    info!("Validating project document '{}'", args.project.display());
    let resolution = Inputs::load(args)?.resolve()?;

    let errors = resolution.diagnostics.errors().count();
    let warnings = resolution.diagnostics.warnings().count();
    if errors > 0 {
        error!("Project document is consistent but has {errors} problems to review");
    }
    info!(
        "Project document is valid: {} volumes, {} LUNs, {warnings} warnings",
        resolution.graph.volumes().len(),
        resolution.graph.luns().len()
    );
    Ok(())
}

/// Resolves the project and emits the graph and its diagnostics.
pub fn resolve_to(
    args: &InputArgs,
    format: OutputFormat,
    output_path: &Option<PathBuf>,
) -> Result<(), SanplanError> {
    let resolution = Inputs::load(args)?.resolve()?;
    let rendered = render(&resolution, format)?;

    match output_path {
        Some(path) => {
            info!("Writing {format} graph to {:?}", path);
            fs::write(path, rendered).structured(InvalidInputError::WriteOutputFile {
                path: path.display().to_string(),
            })?
        }
        None => {
            println!("{rendered}");
        }
    }
    Ok(())
}

pub fn render(resolution: &Resolution, format: OutputFormat) -> Result<String, SanplanError> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(resolution).structured(InternalError::SerializeGraph)
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(resolution).structured(InternalError::SerializeGraph)
        }
    }
}

/// Saves a fatal error as YAML. Failures to do so are only logged.
pub fn write_error(error: &SanplanError, path: &Path) {
    let rendered = match serde_yaml::to_string(error) {
        Ok(rendered) => rendered,
        Err(e) => {
            error!("Failed to serialize error: {e}");
            return;
        }
    };
    if let Err(e) = fs::write(path, rendered) {
        error!("Failed to write error to file: {e}");
    }
}
