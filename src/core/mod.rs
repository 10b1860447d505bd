pub mod cast;
pub mod encode;
pub mod repository;
pub mod session;
pub mod stream;

pub use crate::domain::model::{
    CastSequence, HexagramCode, HexagramContext, HexagramEncoding, InterpretationOutcome,
    LineValue, StreamUsage,
};
pub use crate::domain::ports::{ConfigProvider, HexagramDataset, Interpreter, ReadingStore};
pub use crate::utils::error::Result;
