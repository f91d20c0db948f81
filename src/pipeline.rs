//! Pipeline orchestration
//!
//! - Back up project settings
//! - Optionally replace dependencies with compact variants and re-lock
//! - Compile the package and assemble its wheel
//! - Generate typing stubs and assemble their wheel
//! - Clean up staging and restore settings on every exit path

use std::fs;
use std::path::{Path, PathBuf};

use compact_deps::{hard_replace, ReplaceRules, Replacement, RewriteError};
use thiserror::Error;
use tracing::{error, info};

use crate::compiler::{
    compile_package, BytecodeCompiler, CompileError, CompileOptions, OptimizationLevel,
};
use crate::config::{CompactConfig, ConfigError};
use crate::fsutil::{purge_bytecode_cache, remove_tree, ExcludeRules, FsError};
use crate::metadata::{MetadataError, MetadataProvider};
use crate::project::{
    Installer, PackageIdentity, ProjectError, ProjectManifest, SettingsBackup, PYPROJECT_FILE,
};
use crate::python::PythonVersion;
use crate::signal::InterruptFlag;
use crate::stubs::{compile_stubs, StubGenerator};
use crate::tool::ToolError;
use crate::wheel::{WheelAssembler, WheelError, WheelKind, WheelPackage};

/// Staging directory name inside the target directory
pub const STAGING_DIR: &str = "tmp";

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("project error: {0}")]
    Project(#[from] ProjectError),

    #[error("compilation error: {0}")]
    Compile(#[from] CompileError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("wheel error: {0}")]
    Wheel(#[from] WheelError),

    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("dependency replacement failed: {0}")]
    ReplacementFailed(String),

    #[error("project is not locked: {0} not found")]
    NotLocked(PathBuf),

    #[error("interrupted")]
    Interrupted,
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Project(_) => 1,
            PipelineError::Compile(_) => 1,
            PipelineError::Metadata(_) => 1,
            PipelineError::Wheel(_) => 1,
            PipelineError::Fs(_) => 1,
            PipelineError::Tool(_) => 1,
            PipelineError::Rewrite(_) => 1,
            PipelineError::ReplacementFailed(_) => 1,
            PipelineError::NotLocked(_) => 1,
            PipelineError::Interrupted => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// External collaborators used by the pipeline
pub struct Toolchain<'a> {
    pub compiler: &'a dyn BytecodeCompiler,
    pub stub_generator: &'a dyn StubGenerator,
    pub metadata: &'a dyn MetadataProvider,
    pub installer: &'a dyn Installer,
    /// Version of the interpreter the compiler runs
    pub python: PythonVersion,
}

/// What to build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    pub distribution_name: String,
    pub importable_name: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub build_package: bool,
    pub build_stubs: bool,
    /// Dependencies to swap for compact variants before building
    pub replace: Vec<String>,
    /// Show tool output and keep staging artifacts
    pub verbose: bool,
}

impl BuildRequest {
    pub fn new(project_dir: impl Into<PathBuf>, distribution_name: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            distribution_name: distribution_name.into(),
            importable_name: None,
            source_dir: None,
            build_package: true,
            build_stubs: false,
            replace: Vec::new(),
            verbose: false,
        }
    }
}

/// Result of a build
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub package_wheel: Option<PathBuf>,
    pub stubs_wheel: Option<PathBuf>,
    pub replacements: Vec<Replacement>,
    /// Whether the staging directory was removed
    pub cleaned: bool,
}

/// Result of a persisted dependency replacement
#[derive(Debug, Clone)]
pub enum ReplaceOutcome {
    /// No names or prefixes configured
    NothingToReplace,
    /// Rules matched no dependency
    NothingReplaced,
    Replaced(Vec<Replacement>),
}

/// Owns the staging directory; removes it and purges source bytecode
/// caches when dropped unless artifacts are kept
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    sources: Vec<PathBuf>,
    keep: bool,
    finished: bool,
}

impl StagingDir {
    /// Start from an empty directory at `path`
    pub fn prepare(path: impl Into<PathBuf>, keep: bool) -> Result<Self, FsError> {
        let path = path.into();
        if path.exists() {
            remove_tree(&path)?;
        }
        fs::create_dir_all(&path).map_err(FsError::io(&path))?;
        Ok(Self {
            path,
            sources: Vec::new(),
            keep,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Purge bytecode caches under `source` during cleanup
    pub fn track_source(&mut self, source: impl Into<PathBuf>) {
        self.sources.push(source.into());
    }

    /// Clean up now, returning whether anything was removed
    pub fn finish(mut self) -> Result<bool, FsError> {
        self.finished = true;
        self.cleanup()
    }

    fn cleanup(&self) -> Result<bool, FsError> {
        if self.keep {
            return Ok(false);
        }
        for source in &self.sources {
            if source.is_dir() {
                purge_bytecode_cache(source)?;
            }
        }
        if self.path.exists() {
            remove_tree(&self.path)?;
        }
        Ok(true)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.cleanup() {
                error!("failed to clean up {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Runs builds and replacements with a resolved configuration
pub struct Pipeline<'a> {
    config: CompactConfig,
    toolchain: Toolchain<'a>,
    interrupt: InterruptFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: CompactConfig, toolchain: Toolchain<'a>) -> Self {
        Self {
            config,
            toolchain,
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &CompactConfig {
        &self.config
    }

    fn check_interrupt(&self) -> PipelineResult<()> {
        if self.interrupt.is_interrupted() {
            Err(PipelineError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Build the compact wheel and/or the stub wheel.
    ///
    /// `pyproject.toml` and `poetry.lock` are restored afterwards, so a
    /// replacement made for the build never outlives it.
    pub fn build(&self, request: &BuildRequest) -> PipelineResult<BuildOutcome> {
        let project_dir = fs::canonicalize(&request.project_dir).map_err(|source| {
            ProjectError::Io {
                path: request.project_dir.clone(),
                source,
            }
        })?;
        let backup = SettingsBackup::acquire(&project_dir)?;

        let target_dir = project_dir.join(&self.config.target);
        let keep = self.config.keep_artifacts || request.verbose;
        let mut staging = StagingDir::prepare(target_dir.join(STAGING_DIR), keep)?;

        let mut outcome = BuildOutcome::default();
        if !request.replace.is_empty() {
            outcome.replacements = self
                .replace_for_build(&project_dir, &request.replace)
                .map_err(|e| match e {
                    PipelineError::ReplacementFailed(_) => e,
                    other => PipelineError::ReplacementFailed(other.to_string()),
                })?;
        }
        self.check_interrupt()?;

        if !request.build_package && !request.build_stubs {
            outcome.cleaned = staging.finish()?;
            backup.restore()?;
            return Ok(outcome);
        }

        let metadata = self
            .toolchain
            .metadata
            .metadata(&request.distribution_name)?;
        let version = resolve_version(&project_dir, metadata.get("Version"))?;
        let identity = PackageIdentity::resolve(
            &request.distribution_name,
            request.importable_name.as_deref(),
            request.source_dir.as_deref(),
            version,
            &project_dir,
        );
        staging.track_source(identity.source_root.clone());
        info!(
            distribution = %identity.distribution_name,
            package = %identity.importable_name,
            version = %identity.version,
            "building"
        );

        let quiet = !request.verbose;
        if request.build_package {
            let stage_root = staging.path().join("package");
            let options = CompileOptions {
                optimization: OptimizationLevel::from_optimize(self.config.optimize),
                quiet,
                ignore_compile_errors: self.config.ignore_compile_errors,
                collision_policy: self.config.collision_policy,
                excludes: ExcludeRules::with_patterns(self.config.exclude.as_slice())
                    .map_err(FsError::from)?,
                encoding: self.config.record_encoding,
            };
            let records = compile_package(
                self.toolchain.compiler,
                &identity.source_root,
                &stage_root.join(&identity.importable_name),
                &options,
            )?;

            let package = WheelPackage::new(
                &identity.distribution_name,
                &identity.version,
                WheelKind::Compact {
                    suffix: self.config.suffix.clone(),
                },
            );
            outcome.package_wheel = Some(
                WheelAssembler::new(&stage_root, &target_dir, self.toolchain.python)
                    .with_encoding(self.config.record_encoding)
                    .assemble(&package, &metadata, records)?,
            );
        }
        self.check_interrupt()?;

        if request.build_stubs {
            let stage_root = staging.path().join("stubs");
            let records = compile_stubs(
                self.toolchain.stub_generator,
                &identity.importable_name,
                &stage_root,
                quiet,
                self.config.record_encoding,
            )?;

            let package = WheelPackage::new(
                &identity.distribution_name,
                &identity.version,
                WheelKind::Stubs {
                    importable_name: identity.importable_name.clone(),
                },
            );
            outcome.stubs_wheel = Some(
                WheelAssembler::new(&stage_root, &target_dir, self.toolchain.python)
                    .with_encoding(self.config.record_encoding)
                    .assemble(&package, &metadata, records)?,
            );
        }

        outcome.cleaned = staging.finish()?;
        backup.restore()?;
        Ok(outcome)
    }

    /// Rewrite the manifest for a build and re-lock.
    ///
    /// Every requested name must be a replaceable main dependency.
    fn replace_for_build(
        &self,
        project_dir: &Path,
        names: &[String],
    ) -> PipelineResult<Vec<Replacement>> {
        let rules = ReplaceRules::new(&self.config.suffix).with_names(names);

        let group = ProjectManifest::load(project_dir)?.main_group()?;
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| group.get(name).is_none() || !rules.is_replaceable(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(PipelineError::ReplacementFailed(format!(
                "not a replaceable main dependency: {}",
                unknown.join(", ")
            )));
        }

        let replacements = self.rewrite_manifest(project_dir, &rules)?;
        if !replacements.is_empty() {
            self.toolchain.installer.lock(project_dir)?;
        }
        Ok(replacements)
    }

    fn replace_rules(&self) -> ReplaceRules {
        ReplaceRules::new(&self.config.suffix)
            .with_names(&self.config.replace)
            .with_prefixes(&self.config.prefixes)
    }

    /// Apply rules to `pyproject.toml`, saving it only when something changed
    fn rewrite_manifest(
        &self,
        project_dir: &Path,
        rules: &ReplaceRules,
    ) -> PipelineResult<Vec<Replacement>> {
        let mut manifest = ProjectManifest::load(project_dir)?;
        let mut group = manifest.main_group()?;
        let replacements = hard_replace(
            manifest.document_mut(),
            &mut group,
            rules,
            self.config.dependency_source.as_deref(),
            &self.toolchain.python.pinned_constraint(),
        )?;

        if replacements.is_empty() {
            info!("no dependency matched the replacement rules");
        } else {
            manifest.save()?;
            for replacement in &replacements {
                info!(
                    from = %replacement.original,
                    to = %replacement.replacement,
                    "replaced dependency"
                );
            }
        }
        Ok(replacements)
    }

    /// Persistently replace dependencies matching the configured rules,
    /// then re-lock and sync through the installer
    pub fn replace(&self, project_dir: &Path) -> PipelineResult<ReplaceOutcome> {
        let rules = self.replace_rules();
        if rules.is_empty() {
            return Ok(ReplaceOutcome::NothingToReplace);
        }
        if !self.toolchain.installer.is_locked(project_dir) {
            return Err(PipelineError::NotLocked(
                project_dir.join(crate::project::LOCK_FILE),
            ));
        }

        let backup = SettingsBackup::acquire(project_dir)?;
        let replacements = self.rewrite_manifest(project_dir, &rules)?;
        if replacements.is_empty() {
            backup.restore()?;
            return Ok(ReplaceOutcome::NothingReplaced);
        }
        self.check_interrupt()?;

        self.toolchain.installer.lock(project_dir)?;
        self.toolchain.installer.sync(project_dir)?;
        backup.commit()?;
        Ok(ReplaceOutcome::Replaced(replacements))
    }
}

/// Version from the manifest, else from the metadata provider
fn resolve_version(project_dir: &Path, metadata_version: Option<&str>) -> PipelineResult<String> {
    let manifest_path = project_dir.join(PYPROJECT_FILE);
    if manifest_path.is_file() {
        let manifest = ProjectManifest::load(project_dir)?;
        if let Some(version) = manifest.version() {
            return Ok(version.to_string());
        }
    }
    metadata_version
        .map(str::to_string)
        .ok_or_else(|| ProjectError::MissingVersion {
            path: manifest_path,
        })
        .map_err(PipelineError::from)
}
