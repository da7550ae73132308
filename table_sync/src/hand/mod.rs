//! Hand lifecycle and the showdown presentation that runs at its end.

pub mod lifecycle;
pub mod showdown;

pub use lifecycle::{HandLifecycle, LifecycleEvent};
pub use showdown::{ShowdownEvent, ShowdownPhase, ShowdownPresenter};
