#![doc = include_str!("../README.md")]

pub mod performance;
pub mod platform;

#[cfg(test)]
pub mod test_support;
