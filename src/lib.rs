#![forbid(unsafe_code)]

pub mod assemble;
pub mod codec;
pub mod colormap;
pub mod config;
pub mod discover;
pub mod foundation;
pub mod grid;
pub mod processor;
pub mod profile;
pub mod range;
pub mod render;

pub use assemble::{Assembler, AssemblerKind, FrameSet, create_assembler};
pub use codec::{CachePolicy, DecodeOutcome, GridCodec};
pub use config::{MeshConfig, ReportConfig, SolverConfig};
pub use discover::{Discovery, RawFrame, RunKind, discover};
pub use foundation::core::{GridShape, Timestep};
pub use foundation::error::{ReportError, ReportResult};
pub use grid::Grid;
pub use processor::{AssembleOutcome, RunOptions, RunProcessor, RunSummary, Stage};
pub use profile::Profile;
pub use range::{NormalizationRange, RangeTracker};
pub use render::{
    RenderOutcome, RenderPolicy,
    grid::{GridFrameOpts, render_cached_grid, render_grid_frame},
    mesh::{MeshBackend, MeshPlotOptions, MeshStyle, PyVistaBackend, render_mesh_frame},
};
