// Media service backends

pub mod http;
pub mod simulated;

pub use http::HttpMediaService;
pub use simulated::SimulatedService;
