pub mod mock_delivery;
pub mod mock_remote;

pub use mock_delivery::*;
pub use mock_remote::*;
