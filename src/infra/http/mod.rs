mod middleware;
mod public;
mod static_files;

pub use middleware::{RequestContext, SERVER_IDENT};
pub use public::{HttpState, build_router};
pub use static_files::{
    ASSET_CACHE_CONTROL, AssetIntercept, SNAPSHOT_CACHE_CONTROL, serve_asset,
    stored_file_response,
};
