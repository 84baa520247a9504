pub mod error;
pub mod macro_econ;
pub mod market;
pub mod news;

pub use error::{Result, SourceError};
pub use macro_econ::MacroClient;
pub use market::MarketClient;
pub use news::NewsClient;
