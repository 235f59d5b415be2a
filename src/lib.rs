#![doc = include_str!("../README.md")]
#![deny(unreachable_pub)]

pub mod cli;
pub mod config;
pub mod console;
pub mod cont;
pub mod error;
pub mod eval;
pub mod function;
pub mod parser;
pub mod phrase;
pub mod primitive;
pub mod symbol;
pub mod tag;
pub mod token;
pub mod value;

pub use error::{ApplError, ErrorCode};
pub use eval::Interpreter;
pub use value::Value;
