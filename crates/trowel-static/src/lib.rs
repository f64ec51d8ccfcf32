//! Build pipeline for trowel static sites.
//!
//! Turns a source tree of HTML templates, SCSS, JavaScript and static assets
//! into a distribution folder, with vendor assets copied and linked in.

pub mod assets;
pub mod builder;
pub mod format;
pub mod rules;
pub mod templates;

pub use assets::{AssetError, AssetPipeline};
pub use builder::{BuildConfig, BuildError, BuildResult, StaticBuilder, TaskReport};
pub use format::FormatOptions;
pub use rules::{SourceRules, Task};
