pub mod job;
pub mod parser;
pub mod tokenizer;
