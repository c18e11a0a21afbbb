pub use installed::InstalledDistribution;
pub use metadata::{Error, Metadata};
pub use requires_txt::RequiresTxt;

mod installed;
mod metadata;
mod requires_txt;
