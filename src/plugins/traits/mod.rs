pub mod resolver;

pub use resolver::LunchResolver;

#[cfg(test)]
pub use resolver::MockLunchResolver;
