pub mod curation;
pub mod settings;

pub use curation::CurationConfig;
pub use settings::{Credentials, Settings};
