pub mod aggregate;
pub mod ideas;
pub mod prefs;
pub mod reconciler;
pub mod visibility;

pub use reconciler::{
    ActiveSessionReconciler, ActiveSnapshot, Phase, ReconcilerConfig, SessionRequest, Tick,
};
