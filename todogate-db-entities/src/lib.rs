#![allow(non_snake_case)]

pub mod ApiToken;
pub mod Todo;
pub mod User;
