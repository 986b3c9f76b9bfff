pub mod core;
pub mod rag;
