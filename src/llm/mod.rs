pub mod openai;
pub mod parse;
pub mod provider;
pub mod types;
