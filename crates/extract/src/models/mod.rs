mod classification;
mod media;
mod record;

pub use self::classification::Classification;
pub use self::media::{MediaKind, MediaType};
pub use self::record::{Dimensions, Extracted, MediaRecord, Technical};
