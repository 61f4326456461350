pub mod handle;
pub mod key;
pub mod params;
pub mod state;
pub mod status;

pub use handle::*;
pub use key::*;
pub use params::*;
pub use state::*;
pub use status::*;
