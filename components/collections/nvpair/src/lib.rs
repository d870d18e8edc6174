pub mod nvlist;
pub mod nvpair;
pub mod utils;

pub use nvlist::{NvEncode, NvList, NvUnique, NV_FLAG_NOENTOK};
pub use nvpair::{DataType, NvValue, Nvpair};
