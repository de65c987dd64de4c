//! Standard activity library
//!
//! Collection of built-in activities for common operations

mod debug;
mod list;
mod text;
mod time;
mod transform;

pub use debug::{DebugActivity, DebugActivityFactory};
pub use list::{FlattenActivity, FlattenActivityFactory};
pub use text::{ConcatActivity, ConcatActivityFactory, SplitActivity, SplitActivityFactory};
pub use time::{DelayActivity, DelayActivityFactory};
pub use transform::{
    IdentityActivity, IdentityActivityFactory, JsonParseActivity, JsonParseActivityFactory, JsonStringifyActivity,
    JsonStringifyActivityFactory,
};

use loomruntime::ActivityRegistry;
use std::sync::Arc;

/// Register all standard activities with a registry
pub fn register_all(registry: &mut ActivityRegistry) {
    registry.register(Arc::new(debug::DebugActivityFactory));
    registry.register(Arc::new(transform::JsonParseActivityFactory));
    registry.register(Arc::new(transform::JsonStringifyActivityFactory));
    registry.register(Arc::new(transform::IdentityActivityFactory));
    registry.register(Arc::new(time::DelayActivityFactory));
    registry.register(Arc::new(text::ConcatActivityFactory));
    registry.register(Arc::new(text::SplitActivityFactory));
    registry.register(Arc::new(list::FlattenActivityFactory));
}
