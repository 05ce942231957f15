pub mod cursor;
pub mod include;
pub mod lexer;
pub mod token;
pub mod token_dumper;
