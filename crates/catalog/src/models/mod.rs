mod log;
mod tag;
mod version;

pub use self::log::LogRecord;
pub(crate) use self::log::LogRow;
pub use self::tag::TagRecord;
pub use self::version::{NewVersion, VersionRecord};
pub(crate) use self::version::{NewVersionRow, VersionRow};
