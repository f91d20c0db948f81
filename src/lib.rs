//! compact-wheel - bytecode-only Python wheels
//!
//! Compiles a Python package to bytecode and packages the result (and
//! optionally its typing stubs) as wheels, and rewrites project
//! dependencies to point at such compact builds.

pub mod compiler;
pub mod config;
pub mod fsutil;
pub mod metadata;
pub mod pipeline;
pub mod project;
pub mod python;
pub mod record;
pub mod signal;
pub mod stubs;
pub mod tool;
pub mod wheel;

pub use compiler::{compile_package, BytecodeCompiler, CompileOptions, OptimizationLevel};
pub use metadata::{CoreMetadata, MetadataProvider, MetadataSource};
pub use pipeline::{
    BuildOutcome, BuildRequest, Pipeline, PipelineError, ReplaceOutcome, Toolchain,
};
pub use record::{DigestEncoding, IntegrityRecord};
pub use stubs::{compile_stubs, StubGenerator};
pub use wheel::{verify_wheel, WheelAssembler, WheelKind, WheelPackage};
