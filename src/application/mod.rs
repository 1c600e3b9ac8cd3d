//! Application services: readiness, rendering, snapshot policy and the
//! request pipeline that ties them together.

pub mod error;
pub mod intercept;
pub mod pipeline;
pub mod prerender;
pub mod readiness;
pub mod render;
pub mod snapshot;
pub mod storage;
