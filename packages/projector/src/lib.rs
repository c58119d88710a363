pub mod math;
pub mod projector;
pub mod rules;
pub mod visual;

pub use math::{CachedMathLayout, MathLayout, MathRender, PlainMathLayout};
pub use projector::{IncrementalProjection, Projector};
pub use rules::{EnvironmentLayout, LayoutRules};
pub use visual::{BoxKind, BoxRole, Style, VisualBox, VisualTree};
