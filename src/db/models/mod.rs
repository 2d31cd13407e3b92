mod block;
mod swap;

pub use block::BlockRecord;
pub use swap::SwapRecord;
