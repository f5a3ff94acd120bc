pub mod ast;
pub mod cache;
pub mod validator;
