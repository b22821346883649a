pub mod analysis;
pub mod api_response;
pub mod feed;
pub mod pinning;
pub mod search;
