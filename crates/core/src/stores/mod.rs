pub mod jsonl;

pub use jsonl::JsonlChunkStore;
