//! Feedback-loop state engine.
//!
//! One reducer folds events into a single state value. Any number of
//! feedback loops observe the state stream and emit events back into the
//! reducer: state → loops → events → reducer → state.
//!
//! State mutation is centralized and serialized in [`System`]; effect
//! production is spread across loops and runs concurrently. Loops are built
//! directly with [`FeedbackLoop::new`], or with the [`react`] family (query +
//! effect, latest-wins) and the [`bind`] family (hand-wired bindings,
//! optionally scoped to an owner).

pub mod bind;
pub mod config;
pub mod engine;
pub mod error;
pub mod react;
pub mod traits;

pub use bind::{bind, bind_with_owner, Bindings};
pub use config::SystemConfig;
pub use engine::{system, SharedStateStream, SharedSystem, System};
pub use error::FeedbackError;
pub use react::{react, react_set, react_trigger};
pub use traits::{EventStream, FeedbackLoop, Reducer, StateStream};
