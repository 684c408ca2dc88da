mod array;
mod atomic;
mod item;
mod map;
mod sequence;

pub use array::ArrayItem;
pub use atomic::AtomicItem;
pub(crate) use atomic::format_double;
pub use item::{CollectionValue, Item};
pub use map::{DuplicateKeyPolicy, MapItem, MapKey};
pub use sequence::Sequence;
